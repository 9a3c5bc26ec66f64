pub mod settings;

pub use settings::{
    Config,
    DirectionConfig,
    LineConfig,
    ParityConfig,
    PollingConfig,
    RegisterMapConfig,
    SerialConfig,
    SinkConfig,
    DEFAULT_KEYS,
};
