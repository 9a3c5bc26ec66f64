pub mod client;
pub mod protocol;
pub mod crc;

pub use client::{MasterOptions, ModbusClientTrait, RtuMaster};
pub use protocol::{build_read_request, parse_read_reply, Frame, ReadRequest, Reading};
pub use crc::crc16_modbus;
