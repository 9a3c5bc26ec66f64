use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::protocol::{expected_reply_len, parse_read_reply, validate_count, Frame, ReadRequest};
use crate::bus::{DirectionController, Transport};
use crate::config::RegisterMapConfig;
use crate::utils::error::ModbusError;

/// How often the reader re-checks the input buffer while waiting.
const DEFAULT_POLL_STEP: Duration = Duration::from_millis(1);

#[async_trait]
pub trait ModbusClientTrait: Send {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;
}

#[derive(Debug, Clone, Copy)]
pub struct MasterOptions {
    pub timeout: Duration,
    pub poll_step: Duration,
    /// Drop unconsumed input before each request and after each failed reply.
    pub resync_input: bool,
}

impl MasterOptions {
    pub fn from_register_map(map: &RegisterMapConfig) -> Self {
        Self {
            timeout: Duration::from_millis(map.timeout_ms as u64),
            poll_step: DEFAULT_POLL_STEP,
            resync_input: map.resync_input,
        }
    }
}

impl Default for MasterOptions {
    fn default() -> Self {
        Self::from_register_map(&RegisterMapConfig::default())
    }
}

/// Modbus RTU master on a half-duplex link. Sole owner of the transport and
/// of the transceiver direction.
pub struct RtuMaster<T: Transport> {
    transport: T,
    direction: DirectionController,
    options: MasterOptions,
}

impl<T: Transport> RtuMaster<T> {
    /// Puts the bus in receive mode before anything else happens.
    pub fn new(transport: T, mut direction: DirectionController, options: MasterOptions) -> Result<Self, ModbusError> {
        direction.assert_receive()?;
        info!(
            "📡 RTU master ready: timeout {:?}, input resync {}",
            options.timeout,
            if options.resync_input { "on" } else { "off" }
        );
        Ok(Self {
            transport,
            direction,
            options,
        })
    }

    pub fn direction(&self) -> &DirectionController {
        &self.direction
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Sends `frame` inside the transmit bracket: driver on, write, drain,
    /// driver off.
    pub fn send_request(&mut self, frame: &Frame) -> Result<(), ModbusError> {
        debug!("📤 Sending frame: {}", frame);
        let transport = &mut self.transport;
        self.direction.transmit(|| {
            transport.write_all(frame.as_bytes())?;
            transport.flush()
        })
    }

    /// Waits up to `timeout` for a complete reply, then validates it.
    ///
    /// Partial input is left in place on timeout unless resync is enabled.
    pub async fn read_reply(
        &mut self,
        expected_slave: u8,
        expected_count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, ModbusError> {
        validate_count(expected_count)?;
        let expected_len = expected_reply_len(expected_count);
        let started = Instant::now();

        loop {
            let available = self.transport.bytes_available()?;
            if available >= expected_len {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!(
                    "⚠️ Timeout waiting for reply from slave {}: {}/{} bytes after {:?}",
                    expected_slave, available, expected_len, elapsed
                );
                self.resync("timeout");
                return Err(ModbusError::Timeout {
                    expected: expected_len,
                    received: available,
                });
            }
            sleep(self.options.poll_step.min(timeout - elapsed)).await;
        }

        let mut buf = vec![0u8; expected_len];
        self.transport.read_exact(&mut buf)?;
        debug!("📥 Reply frame: {}", hex::encode_upper(&buf));

        parse_read_reply(&buf, expected_slave, expected_count).map_err(|e| {
            warn!("⚠️ Rejected reply {}: {}", hex::encode_upper(&buf), e);
            self.resync("invalid reply");
            e
        })
    }

    /// One complete request/response exchange.
    pub async fn transact(&mut self, request: &ReadRequest) -> Result<Vec<u16>, ModbusError> {
        self.resync("stale input");
        self.send_request(&request.to_frame())?;
        self.read_reply(request.slave_address, request.register_count, self.options.timeout)
            .await
    }

    fn resync(&mut self, reason: &str) {
        if !self.options.resync_input {
            return;
        }
        match self.transport.discard_input() {
            Ok(0) => {}
            Ok(dropped) => warn!("🧹 Discarded {} byte(s) of input ({})", dropped, reason),
            Err(e) => warn!("⚠️ Failed to discard input ({}): {}", reason, e),
        }
    }
}

#[async_trait]
impl<T: Transport> ModbusClientTrait for RtuMaster<T> {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        debug!("📊 Reading {} registers from device {} starting at 0x{:04X}", count, slave_id, start_addr);
        let request = ReadRequest::new(slave_id, start_addr, count)?;
        self.transact(&request).await
    }
}
