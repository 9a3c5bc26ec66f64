use log::{error, trace};
use std::thread;
use std::time::Duration;

use super::line::OutputLine;
use crate::utils::error::ModbusError;

pub const DEFAULT_SETTLE: Duration = Duration::from_micros(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Receiving,
    Transmitting,
}

/// Switches a half-duplex RS-485 transceiver between transmit and receive.
///
/// The receiver is always disabled before the driver is enabled, and the
/// driver is always disabled before the receiver is enabled, so both are
/// never on at once. Each switch blocks for the settle interval.
pub struct DirectionController {
    driver_enable: Box<dyn OutputLine>,
    receiver_enable: Option<Box<dyn OutputLine>>,
    settle: Duration,
    state: BusState,
}

impl DirectionController {
    pub fn new(
        driver_enable: Box<dyn OutputLine>,
        receiver_enable: Option<Box<dyn OutputLine>>,
        settle: Duration,
    ) -> Self {
        Self {
            driver_enable,
            receiver_enable,
            settle,
            // Pessimistic until the lines have actually been written.
            state: BusState::Transmitting,
        }
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    pub fn assert_transmit(&mut self) -> Result<(), ModbusError> {
        if let Some(re) = self.receiver_enable.as_mut() {
            re.set_active(false)?;
        }
        self.driver_enable.set_active(true)?;
        self.state = BusState::Transmitting;
        thread::sleep(self.settle);
        trace!("bus -> transmit");
        Ok(())
    }

    pub fn assert_receive(&mut self) -> Result<(), ModbusError> {
        self.driver_enable.set_active(false)?;
        if let Some(re) = self.receiver_enable.as_mut() {
            re.set_active(true)?;
        }
        self.state = BusState::Receiving;
        thread::sleep(self.settle);
        trace!("bus -> receive");
        Ok(())
    }

    /// Runs `send` with the driver enabled and returns the bus to receive on
    /// every path, including when `assert_transmit` or `send` fails.
    pub fn transmit<T, F>(&mut self, send: F) -> Result<T, ModbusError>
    where
        F: FnOnce() -> Result<T, ModbusError>,
    {
        let result = self.assert_transmit().and_then(|_| send());
        match (result, self.assert_receive()) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(release)) => Err(release),
            (Err(e), Err(release)) => {
                error!("❌ Failed to release RS-485 driver after error: {}", release);
                Err(e)
            }
        }
    }
}
