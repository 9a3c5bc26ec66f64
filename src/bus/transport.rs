use log::{error, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;

use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// Byte-level access to the half-duplex link.
///
/// `bytes_available` must not block; the reader polls it against a deadline.
pub trait Transport: Send {
    fn bytes_available(&mut self) -> Result<usize, ModbusError>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ModbusError>;
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModbusError>;
    /// Blocks until every written byte has left the UART.
    fn flush(&mut self) -> Result<(), ModbusError>;
    /// Drops pending input and returns how many bytes were dropped.
    fn discard_input(&mut self) -> Result<usize, ModbusError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_available(&mut self) -> Result<usize, ModbusError> {
        (**self).bytes_available()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ModbusError> {
        (**self).read_exact(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        (**self).write_all(bytes)
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        (**self).flush()
    }

    fn discard_input(&mut self) -> Result<usize, ModbusError> {
        (**self).discard_input()
    }
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", config.port);
        info!(
            "⚙️  Configuration: {} baud, {} data bits, {:?} parity, {} stop bit(s)",
            config.baud_rate, config.data_bits, config.parity, config.stop_bits
        );

        let serial_parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let data_bits = match config.data_bits {
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ModbusError::ConfigError(format!("unsupported data bits: {}", other)));
            }
        };
        let stop_bits = match config.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ModbusError::ConfigError(format!("unsupported stop bits: {}", other)));
            }
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port, e);
                ModbusError::ConnectionError(format!("Failed to open port: {}", e))
            })?;

        info!("✅ Modbus RTU connection established successfully");
        Ok(Self { port })
    }

    /// Second handle on the same device, used to drive its modem control lines.
    pub fn try_clone_port(&self) -> Result<Box<dyn SerialPort>, ModbusError> {
        Ok(self.port.try_clone()?)
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> Result<usize, ModbusError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ModbusError> {
        self.port
            .read_exact(buf)
            .map_err(|e| ModbusError::CommunicationError(format!("Read failed: {}", e)))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        self.port
            .write_all(bytes)
            .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        self.port
            .flush()
            .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))
    }

    fn discard_input(&mut self) -> Result<usize, ModbusError> {
        let pending = self.port.bytes_to_read()? as usize;
        self.port.clear(ClearBuffer::Input)?;
        Ok(pending)
    }
}
