use clap::ArgMatches;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::modbus::protocol::MAX_READ_REGISTERS;
use crate::utils::error::ModbusError;

pub const DEFAULT_KEYS: [&str; 3] = ["nitrogen", "phosphorus", "potassium"];

/// Shortest turnaround the transceiver tolerates after a direction switch.
pub const MIN_SETTLE_US: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial: SerialConfig,

    // Transceiver wiring
    pub direction: DirectionConfig,

    // Sensor register map
    pub register_map: RegisterMapConfig,

    // Scheduling
    pub polling: PollingConfig,

    // Downstream sink
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: ParityConfig,
    pub stop_bits: u8,
    /// Blocking read timeout of the port itself; replies are only read once
    /// complete, so this rarely matters.
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

/// One transceiver enable input and how it is driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineConfig {
    Rts {
        #[serde(default)]
        active_low: bool,
    },
    Dtr {
        #[serde(default)]
        active_low: bool,
    },
    /// Linux sysfs GPIO pin, exported and set to output on open.
    Gpio {
        pin: u32,
        #[serde(default = "default_gpio_base")]
        base_path: String,
        #[serde(default)]
        active_low: bool,
    },
    None,
}

fn default_gpio_base() -> String {
    "/sys/class/gpio".to_string()
}

impl LineConfig {
    pub fn uses_modem_signal(&self) -> bool {
        matches!(self, LineConfig::Rts { .. } | LineConfig::Dtr { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    pub settle_us: u64,
    pub driver_enable: LineConfig,
    /// Absent when /RE is tied low on the board.
    pub receiver_enable: Option<LineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMapConfig {
    pub slave_address: u8,
    pub start_register: u16,
    pub register_count: u16,
    pub timeout_ms: u32,
    pub resync_input: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub maintenance_interval_ms: u64,
    /// Log the success rate every this many polls; 0 disables.
    pub stats_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub format: String,
    pub keys: Vec<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(target_os = "windows") {
            "COM1"
        } else if cfg!(target_os = "macos") {
            "/dev/tty.usbserial-0001"
        } else {
            "/dev/ttyUSB0"
        };
        Self {
            port: port.to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: ParityConfig::None,
            stop_bits: 1,
            read_timeout_ms: 1000,
        }
    }
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            settle_us: 100,
            driver_enable: LineConfig::Rts { active_low: false },
            receiver_enable: None,
        }
    }
}

impl Default for RegisterMapConfig {
    fn default() -> Self {
        Self {
            slave_address: 0x01,
            start_register: 0x001E,
            register_count: 3,
            timeout_ms: 500,
            resync_input: true,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            maintenance_interval_ms: 1000,
            stats_every: 20,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            keys: DEFAULT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModbusError::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ModbusError::ConfigError(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ModbusError::SerializationError(format!("TOML error: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Command line values win over the file.
    pub fn apply_overrides(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(port) = matches.get_one::<String>("port") {
            self.serial.port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            self.serial.baud_rate = parse_arg("baud", baud)?;
        }
        if let Some(slave) = matches.get_one::<String>("slave") {
            self.register_map.slave_address = parse_arg("slave", slave)?;
        }
        if let Some(interval) = matches.get_one::<String>("interval") {
            self.polling.interval_ms = parse_arg("interval", interval)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        let map = &self.register_map;
        if map.register_count == 0 || map.register_count > MAX_READ_REGISTERS {
            return Err(ModbusError::ConfigError(format!(
                "register_count must be 1..={}, got {}",
                MAX_READ_REGISTERS, map.register_count
            )));
        }
        if map.timeout_ms == 0 {
            return Err(ModbusError::ConfigError("timeout_ms must be positive".to_string()));
        }
        if self.sink.keys.len() != map.register_count as usize {
            return Err(ModbusError::ConfigError(format!(
                "{} sink keys configured for {} registers",
                self.sink.keys.len(),
                map.register_count
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ModbusError::ConfigError("baud_rate must be positive".to_string()));
        }
        if self.polling.interval_ms == 0 || self.polling.maintenance_interval_ms == 0 {
            return Err(ModbusError::ConfigError("polling intervals must be positive".to_string()));
        }
        if self.direction.settle_us < MIN_SETTLE_US {
            return Err(ModbusError::ConfigError(format!(
                "settle_us must be at least {}, got {}",
                MIN_SETTLE_US, self.direction.settle_us
            )));
        }
        if self.direction.driver_enable == LineConfig::None && self.direction.receiver_enable.is_some() {
            return Err(ModbusError::ConfigError(
                "receiver_enable requires a driver_enable line".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_arg<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ModbusError> {
    value
        .trim()
        .parse()
        .map_err(|_| ModbusError::ConfigError(format!("invalid --{} value: {}", name, value)))
}
