use log::{debug, info};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::transport::Transport;
use crate::modbus::crc::{append_crc, verify_crc};
use crate::modbus::protocol::READ_HOLDING_REGISTERS;
use crate::utils::error::ModbusError;

const ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Misbehaviour the simulated sensor can be told to exhibit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Never answer.
    Silent,
    /// Send only the first `n` bytes of the reply.
    Truncated(usize),
    /// Answer with a different slave address.
    WrongSlave(u8),
    /// Flip one bit of the trailing CRC.
    CorruptCrc,
    /// Declare a wrong byte count in an otherwise well-formed reply.
    WrongByteCount(u8),
    /// Prepend stray bytes to the reply.
    Noise(Vec<u8>),
}

/// A soil sensor living behind the [`Transport`] seam.
///
/// Answers read-holding-registers requests addressed to it from an in-memory
/// register bank, after a configurable turnaround delay.
pub struct SimulatedSensor {
    slave_address: u8,
    base_register: u16,
    registers: Vec<u16>,
    response_delay: Duration,
    fault: Option<Fault>,
    written: Vec<u8>,
    rx: VecDeque<u8>,
    ready_at: Option<Instant>,
    requests: Vec<Vec<u8>>,
}

impl SimulatedSensor {
    pub fn new(slave_address: u8, base_register: u16, registers: Vec<u16>) -> Self {
        info!(
            "🧪 Simulated sensor at address {} serving {} registers from 0x{:04X}",
            slave_address,
            registers.len(),
            base_register
        );
        Self {
            slave_address,
            base_register,
            registers,
            response_delay: Duration::from_millis(10),
            fault: None,
            written: Vec::new(),
            rx: VecDeque::new(),
            ready_at: None,
            requests: Vec::new(),
        }
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn set_fault(&mut self, fault: Option<Fault>) {
        self.fault = fault;
    }

    pub fn set_registers(&mut self, registers: Vec<u16>) {
        self.registers = registers;
    }

    /// Bytes the master has to read, as if they arrived on the wire.
    pub fn inject_input(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Every request frame received, in order.
    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }

    pub fn pending_input(&self) -> usize {
        self.rx.len()
    }

    fn respond(&mut self, request: &[u8]) {
        self.requests.push(request.to_vec());

        if request.len() != 8 || !verify_crc(request) {
            debug!("🧪 Ignoring malformed request {}", hex::encode_upper(request));
            return;
        }
        if request[0] != self.slave_address || request[1] != READ_HOLDING_REGISTERS {
            return;
        }
        if self.fault == Some(Fault::Silent) {
            return;
        }

        let start = u16::from_be_bytes([request[2], request[3]]);
        let count = u16::from_be_bytes([request[4], request[5]]);
        let reply = match self.window(start, count) {
            Some(values) => self.encode_reply(&values),
            None => {
                let mut exception = vec![self.slave_address, READ_HOLDING_REGISTERS | 0x80, ILLEGAL_DATA_ADDRESS];
                append_crc(&mut exception);
                exception
            }
        };

        self.rx.extend(reply);
        self.ready_at = Some(Instant::now() + self.response_delay);
    }

    fn window(&self, start: u16, count: u16) -> Option<Vec<u16>> {
        let offset = start.checked_sub(self.base_register)? as usize;
        let end = offset + count as usize;
        self.registers.get(offset..end).map(|s| s.to_vec())
    }

    fn encode_reply(&self, values: &[u16]) -> Vec<u8> {
        let slave = match self.fault {
            Some(Fault::WrongSlave(addr)) => addr,
            _ => self.slave_address,
        };
        let byte_count = match self.fault {
            Some(Fault::WrongByteCount(n)) => n,
            _ => (values.len() * 2) as u8,
        };

        let mut reply = vec![slave, READ_HOLDING_REGISTERS, byte_count];
        for v in values {
            reply.extend_from_slice(&v.to_be_bytes());
        }
        append_crc(&mut reply);

        match &self.fault {
            Some(Fault::CorruptCrc) => {
                let last = reply.len() - 1;
                reply[last] ^= 0x01;
            }
            Some(Fault::Truncated(n)) => reply.truncate(*n),
            Some(Fault::Noise(noise)) => {
                let mut noisy = noise.clone();
                noisy.extend_from_slice(&reply);
                reply = noisy;
            }
            _ => {}
        }
        reply
    }

    fn reply_arrived(&self) -> bool {
        self.ready_at.map_or(true, |at| Instant::now() >= at)
    }
}

impl Transport for SimulatedSensor {
    fn bytes_available(&mut self) -> Result<usize, ModbusError> {
        if self.reply_arrived() {
            Ok(self.rx.len())
        } else {
            Ok(0)
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ModbusError> {
        if !self.reply_arrived() || self.rx.len() < buf.len() {
            return Err(ModbusError::CommunicationError("Read failed: not enough data".to_string()));
        }
        for slot in buf.iter_mut() {
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        let request = std::mem::take(&mut self.written);
        if !request.is_empty() {
            self.respond(&request);
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<usize, ModbusError> {
        let dropped = self.rx.len();
        self.rx.clear();
        Ok(dropped)
    }
}
