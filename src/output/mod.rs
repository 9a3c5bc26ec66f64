pub mod formatters;
pub mod senders;

pub use formatters::OutputFormat;
pub use senders::{ConsoleSink, ReadingSink, SinkError};
