use chrono::{DateTime, Utc};
use std::fmt;

use super::crc::{append_crc, split_crc};
use crate::utils::error::{ErrorKind, ModbusError};

pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// Largest register count a single 0x03 request may ask for.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Address, function code and byte count.
const REPLY_HEADER_LEN: usize = 3;
const CRC_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub slave_address: u8,
    pub function_code: u8,
    pub start_register: u16,
    pub register_count: u16,
}

impl ReadRequest {
    pub fn new(slave_address: u8, start_register: u16, register_count: u16) -> Result<Self, ModbusError> {
        validate_count(register_count)?;
        Ok(Self {
            slave_address,
            function_code: READ_HOLDING_REGISTERS,
            start_register,
            register_count,
        })
    }

    pub fn to_frame(&self) -> Frame {
        let mut bytes = Vec::with_capacity(8);
        bytes.push(self.slave_address);
        bytes.push(self.function_code);
        bytes.extend_from_slice(&self.start_register.to_be_bytes());
        bytes.extend_from_slice(&self.register_count.to_be_bytes());
        append_crc(&mut bytes);
        Frame(bytes)
    }

    pub fn expected_reply_len(&self) -> usize {
        expected_reply_len(self.register_count)
    }
}

/// A complete CRC-terminated byte sequence as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "[{}]", parts.join(" "))
    }
}

/// Serializes a read-holding-registers request:
/// `[slave][0x03][start hi][start lo][count hi][count lo][crc lo][crc hi]`.
pub fn build_read_request(slave_id: u8, start_register: u16, count: u16) -> Result<Frame, ModbusError> {
    Ok(ReadRequest::new(slave_id, start_register, count)?.to_frame())
}

pub fn expected_reply_len(register_count: u16) -> usize {
    REPLY_HEADER_LEN + 2 * register_count as usize + CRC_LEN
}

pub fn validate_count(register_count: u16) -> Result<(), ModbusError> {
    if register_count == 0 || register_count > MAX_READ_REGISTERS {
        return Err(ModbusError::InvalidData(format!(
            "register count must be 1..={}, got {}",
            MAX_READ_REGISTERS, register_count
        )));
    }
    Ok(())
}

/// Validates a complete 0x03 reply and extracts its big-endian register values.
///
/// Checks run in a fixed order and stop at the first failure: header, declared
/// byte count, then CRC. A slave mismatch is therefore reported even when the
/// checksum is also wrong.
pub fn parse_read_reply(buf: &[u8], expected_slave: u8, expected_count: u16) -> Result<Vec<u16>, ModbusError> {
    validate_count(expected_count)?;

    let expected_len = expected_reply_len(expected_count);
    if buf.len() != expected_len {
        return Err(ModbusError::InvalidData(format!(
            "reply is {} bytes, expected {}",
            buf.len(),
            expected_len
        )));
    }

    if buf[0] != expected_slave || buf[1] != READ_HOLDING_REGISTERS {
        return Err(ModbusError::HeaderMismatch {
            expected_slave,
            slave: buf[0],
            function: buf[1],
        });
    }

    let expected_bytes = (2 * expected_count) as u8;
    if buf[2] != expected_bytes {
        return Err(ModbusError::LengthMismatch {
            expected: expected_bytes,
            declared: buf[2],
        });
    }

    if let Some((computed, received)) = split_crc(buf) {
        if computed != received {
            return Err(ModbusError::CrcMismatch {
                expected: computed,
                received,
            });
        }
    }

    let payload = &buf[REPLY_HEADER_LEN..expected_len - CRC_LEN];
    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Outcome of one poll cycle. Invalid readings carry no values.
#[derive(Debug, Clone)]
pub struct Reading {
    pub valid: bool,
    pub values: Vec<u16>,
    pub error: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn invalid(error: ErrorKind) -> Self {
        Self {
            valid: false,
            values: Vec::new(),
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn valid(values: Vec<u16>) -> Self {
        Self {
            valid: true,
            values,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

impl From<Result<Vec<u16>, ModbusError>> for Reading {
    fn from(result: Result<Vec<u16>, ModbusError>) -> Self {
        match result {
            Ok(values) => Reading::valid(values),
            Err(e) => Reading::invalid(e.kind()),
        }
    }
}
