use log::{debug, info, warn};
use serialport::SerialPort;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::settings::LineConfig;
use crate::utils::error::ModbusError;

/// A digital output feeding one transceiver enable input.
///
/// `set_active(true)` asserts the function (driver on, or receiver on); the
/// electrical level depends on the line's polarity.
pub trait OutputLine: Send {
    fn set_active(&mut self, active: bool) -> Result<(), ModbusError>;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemSignal {
    Rts,
    Dtr,
}

/// RTS or DTR of a serial adapter wired to DE and/or /RE.
pub struct ModemLine {
    port: Box<dyn SerialPort>,
    signal: ModemSignal,
    active_low: bool,
}

impl ModemLine {
    pub fn new(port: Box<dyn SerialPort>, signal: ModemSignal, active_low: bool) -> Self {
        Self { port, signal, active_low }
    }
}

impl OutputLine for ModemLine {
    fn set_active(&mut self, active: bool) -> Result<(), ModbusError> {
        let level = active != self.active_low;
        let result = match self.signal {
            ModemSignal::Rts => self.port.write_request_to_send(level),
            ModemSignal::Dtr => self.port.write_data_terminal_ready(level),
        };
        result.map_err(|e| ModbusError::LineError(format!("{:?} write failed: {}", self.signal, e)))
    }

    fn describe(&self) -> String {
        let polarity = if self.active_low { "active-low" } else { "active-high" };
        format!("{:?} ({})", self.signal, polarity)
    }
}

/// Linux sysfs GPIO pin, driven by writing `0`/`1` to its `value` file.
pub struct GpioLine {
    pin: u32,
    value_path: PathBuf,
    active_low: bool,
}

impl GpioLine {
    /// Exports `pin` under `base_path` unless it already is, then sets it to
    /// output.
    pub fn open<P: AsRef<Path>>(base_path: P, pin: u32, active_low: bool) -> Result<Self, ModbusError> {
        let base = base_path.as_ref();
        let pin_dir = base.join(format!("gpio{}", pin));

        if !pin_dir.exists() {
            debug!("Exporting GPIO {}", pin);
            if let Err(e) = fs::write(base.join("export"), pin.to_string()) {
                // Busy means another process exported it first.
                if !e.to_string().contains("Device or resource busy") {
                    warn!("⚠️ Failed to export GPIO {}: {}", pin, e);
                }
            }
        }

        fs::write(pin_dir.join("direction"), "out").map_err(|e| {
            ModbusError::LineError(format!("GPIO {} direction setup failed: {}", pin, e))
        })?;

        Ok(Self {
            pin,
            value_path: pin_dir.join("value"),
            active_low,
        })
    }
}

impl OutputLine for GpioLine {
    fn set_active(&mut self, active: bool) -> Result<(), ModbusError> {
        let level = active != self.active_low;
        fs::write(&self.value_path, if level { "1" } else { "0" })
            .map_err(|e| ModbusError::LineError(format!("GPIO {} write failed: {}", self.pin, e)))
    }

    fn describe(&self) -> String {
        let polarity = if self.active_low { "active-low" } else { "active-high" };
        format!("GPIO {} ({})", self.pin, polarity)
    }
}

/// Transceivers with automatic direction control need no line at all.
pub struct NoLine;

impl OutputLine for NoLine {
    fn set_active(&mut self, _active: bool) -> Result<(), ModbusError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}

/// Opens the line described by `config`. Modem lines need a handle on the
/// serial port; without one (simulation) they degrade to [`NoLine`].
pub fn open_line(
    config: &LineConfig,
    port: Option<Box<dyn SerialPort>>,
) -> Result<Box<dyn OutputLine>, ModbusError> {
    let line: Box<dyn OutputLine> = match (config, port) {
        (LineConfig::Rts { active_low }, Some(port)) => {
            Box::new(ModemLine::new(port, ModemSignal::Rts, *active_low))
        }
        (LineConfig::Dtr { active_low }, Some(port)) => {
            Box::new(ModemLine::new(port, ModemSignal::Dtr, *active_low))
        }
        (LineConfig::Rts { .. }, None) | (LineConfig::Dtr { .. }, None) => {
            debug!("No serial handle for {:?}, using a no-op line", config);
            Box::new(NoLine)
        }
        (LineConfig::Gpio { pin, base_path, active_low }, _) => {
            Box::new(GpioLine::open(base_path, *pin, *active_low)?)
        }
        (LineConfig::None, _) => Box::new(NoLine),
    };
    info!("🔀 Direction line: {}", line.describe());
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exported_pin(base: &Path, pin: u32) {
        fs::create_dir_all(base.join(format!("gpio{}", pin))).unwrap();
    }

    #[test]
    fn test_gpio_line_levels() {
        let dir = tempfile::tempdir().unwrap();
        exported_pin(dir.path(), 5);

        let mut line = GpioLine::open(dir.path(), 5, false).unwrap();
        let value = dir.path().join("gpio5").join("value");
        line.set_active(true).unwrap();
        assert_eq!(fs::read_to_string(&value).unwrap(), "1");
        line.set_active(false).unwrap();
        assert_eq!(fs::read_to_string(&value).unwrap(), "0");
    }

    #[test]
    fn test_gpio_line_active_low() {
        let dir = tempfile::tempdir().unwrap();
        exported_pin(dir.path(), 4);

        let mut line = GpioLine::open(dir.path(), 4, true).unwrap();
        line.set_active(true).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio4/value")).unwrap(), "0");
        assert!(line.describe().contains("active-low"));
    }

    #[test]
    fn test_gpio_open_sets_output_direction() {
        let dir = tempfile::tempdir().unwrap();
        exported_pin(dir.path(), 17);

        GpioLine::open(dir.path(), 17, false).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio17/direction")).unwrap(), "out");
        assert!(!dir.path().join("export").exists(), "exported pin was exported again");
    }

    #[test]
    fn test_gpio_open_exports_missing_pin() {
        let dir = tempfile::tempdir().unwrap();

        // No kernel behind the tempdir, so the pin directory never appears.
        let result = GpioLine::open(dir.path(), 23, false);
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "23");
        assert!(matches!(result, Err(ModbusError::LineError(_))));
    }

    #[test]
    fn test_gpio_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        exported_pin(dir.path(), 6);

        let config = LineConfig::Gpio {
            pin: 6,
            base_path: dir.path().display().to_string(),
            active_low: false,
        };
        let mut line = open_line(&config, None).unwrap();
        assert_eq!(line.describe(), "GPIO 6 (active-high)");
        line.set_active(true).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio6/value")).unwrap(), "1");
    }

    #[test]
    fn test_gpio_line_missing_base_errors() {
        let result = GpioLine::open("/nonexistent/gpio", 3, false);
        assert!(matches!(result, Err(ModbusError::LineError(_))));
        assert_eq!(result.err().map(|e| e.kind()), Some(crate::utils::error::ErrorKind::Line));
    }

    #[test]
    fn test_modem_line_without_port_is_noop() {
        let mut line = open_line(&LineConfig::Rts { active_low: false }, None).unwrap();
        assert_eq!(line.describe(), "none");
        assert!(line.set_active(true).is_ok());
    }
}
