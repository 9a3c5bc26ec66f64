use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Direction line error: {0}")]
    LineError(String),

    #[error("Timeout waiting for reply: {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error("Bad header: slave 0x{slave:02X} function 0x{function:02X} (expected slave 0x{expected_slave:02X})")]
    HeaderMismatch {
        expected_slave: u8,
        slave: u8,
        function: u8,
    },

    #[error("Unexpected byte count {declared} (expected {expected})")]
    LengthMismatch { expected: u8, declared: u8 },

    #[error("CRC mismatch: computed 0x{expected:04X}, received 0x{received:04X}")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Protocol-level failure class of a poll, used for statistics and for
/// tagging invalid readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    HeaderMismatch,
    LengthMismatch,
    CrcMismatch,
    Io,
    Line,
    Other,
}

impl ModbusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModbusError::Timeout { .. } => ErrorKind::Timeout,
            ModbusError::HeaderMismatch { .. } => ErrorKind::HeaderMismatch,
            ModbusError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            ModbusError::CrcMismatch { .. } => ErrorKind::CrcMismatch,
            ModbusError::ConnectionError(_) | ModbusError::CommunicationError(_) => ErrorKind::Io,
            ModbusError::LineError(_) => ErrorKind::Line,
            _ => ErrorKind::Other,
        }
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::ConnectionError(format!("Serial port error: {}", err))
    }
}
