pub mod direction;
pub mod line;
pub mod simulator;
pub mod transport;

pub use direction::{BusState, DirectionController};
pub use line::{open_line, GpioLine, ModemLine, ModemSignal, NoLine, OutputLine};
pub use simulator::{Fault, SimulatedSensor};
pub use transport::{SerialTransport, Transport};

use std::time::Duration;

use serialport::SerialPort;

use crate::config::settings::LineConfig;
use crate::config::Config;
use crate::utils::error::ModbusError;

/// Opens the configured serial port and its direction lines.
pub fn open_serial(config: &Config) -> Result<(SerialTransport, DirectionController), ModbusError> {
    let transport = SerialTransport::open(&config.serial)?;

    let de = open_line(&config.direction.driver_enable, modem_handle(&transport, &config.direction.driver_enable)?)?;
    let re = match &config.direction.receiver_enable {
        Some(line) => Some(open_line(line, modem_handle(&transport, line)?)?),
        None => None,
    };

    let direction = DirectionController::new(de, re, Duration::from_micros(config.direction.settle_us));
    Ok((transport, direction))
}

/// A simulated sensor answering with `registers`, plus no-op direction lines.
pub fn open_simulated(config: &Config, registers: Vec<u16>) -> (SimulatedSensor, DirectionController) {
    let map = &config.register_map;
    let sensor = SimulatedSensor::new(map.slave_address, map.start_register, registers);
    let direction = DirectionController::new(
        Box::new(NoLine),
        config.direction.receiver_enable.as_ref().map(|_| Box::new(NoLine) as Box<dyn OutputLine>),
        Duration::from_micros(config.direction.settle_us),
    );
    (sensor, direction)
}

fn modem_handle(
    transport: &SerialTransport,
    line: &LineConfig,
) -> Result<Option<Box<dyn SerialPort>>, ModbusError> {
    if line.uses_modem_signal() {
        Ok(Some(transport.try_clone_port()?))
    } else {
        Ok(None)
    }
}
