//! Soil Nutrient Modbus RTU Master
//!
//! Polls an RS-485 nitrogen/phosphorus/potassium probe with
//! read-holding-registers requests, switching the half-duplex transceiver
//! around every transmission and validating each reply before the values are
//! handed to a downstream sink.

pub mod bus;
pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use bus::{BusState, DirectionController, SimulatedSensor, Transport};
pub use config::Config;
pub use devices::{SoilReading, SoilSensor};
pub use modbus::{build_read_request, crc16_modbus, ModbusClientTrait, Reading, RtuMaster};
pub use output::{ConsoleSink, ReadingSink, SinkError};
pub use services::PollService;
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
