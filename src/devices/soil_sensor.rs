use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::config::{RegisterMapConfig, SinkConfig};
use crate::modbus::protocol::{ReadRequest, Reading};
use crate::utils::error::ModbusError;

pub const UNIT: &str = "mg/kg";

/// An RS-485 soil nutrient probe exposing one value per holding register.
#[derive(Debug, Clone)]
pub struct SoilSensor {
    pub address: u8,
    pub start_register: u16,
    pub register_count: u16,
    pub keys: Vec<String>,
}

impl SoilSensor {
    pub fn new(map: &RegisterMapConfig, sink: &SinkConfig) -> Result<Self, ModbusError> {
        if sink.keys.len() != map.register_count as usize {
            return Err(ModbusError::ConfigError(format!(
                "{} keys for {} registers",
                sink.keys.len(),
                map.register_count
            )));
        }
        Ok(Self {
            address: map.slave_address,
            start_register: map.start_register,
            register_count: map.register_count,
            keys: sink.keys.clone(),
        })
    }

    /// A fresh request for every poll.
    pub fn request(&self) -> Result<ReadRequest, ModbusError> {
        ReadRequest::new(self.address, self.start_register, self.register_count)
    }

    /// Pairs a valid reading's values with their keys.
    pub fn label(&self, reading: &Reading) -> Option<SoilReading> {
        if !reading.valid || reading.values.len() != self.keys.len() {
            return None;
        }
        Some(SoilReading {
            device_address: self.address,
            timestamp: reading.timestamp,
            values: self.keys.iter().cloned().zip(reading.values.iter().copied()).collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SoilReading {
    pub device_address: u8,
    pub timestamp: DateTime<Utc>,
    pub values: Vec<(String, u16)>,
}

impl SoilReading {
    pub fn get_parameter(&self, name: &str) -> Option<u16> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    pub fn to_json(&self) -> Value {
        let values: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        serde_json::json!({
            "device_address": self.device_address,
            "timestamp": self.timestamp.to_rfc3339(),
            "unit": UNIT,
            "values": values,
        })
    }
}

impl fmt::Display for SoilReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{}={} {}", k, v, UNIT))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::utils::error::ErrorKind;

    fn sensor() -> SoilSensor {
        let config = Config::default();
        SoilSensor::new(&config.register_map, &config.sink).unwrap()
    }

    #[test]
    fn test_request_matches_register_map() {
        let frame = sensor().request().unwrap().to_frame();
        assert_eq!(frame.as_bytes(), &[0x01, 0x03, 0x00, 0x1E, 0x00, 0x03, 0x65, 0xCD]);
    }

    #[test]
    fn test_label_valid_reading() {
        let reading = sensor().label(&Reading::valid(vec![32, 21, 64])).unwrap();
        assert_eq!(reading.get_parameter("nitrogen"), Some(32));
        assert_eq!(reading.get_parameter("phosphorus"), Some(21));
        assert_eq!(reading.get_parameter("potassium"), Some(64));
        assert_eq!(reading.get_parameter("sodium"), None);
        assert_eq!(
            reading.to_string(),
            "nitrogen=32 mg/kg, phosphorus=21 mg/kg, potassium=64 mg/kg"
        );
        assert_eq!(reading.to_json()["values"]["potassium"], 64);
    }

    #[test]
    fn test_invalid_reading_has_no_labels() {
        assert!(sensor().label(&Reading::invalid(ErrorKind::CrcMismatch)).is_none());
    }

    #[test]
    fn test_key_count_must_match() {
        let mut config = Config::default();
        config.sink.keys.pop();
        assert!(SoilSensor::new(&config.register_map, &config.sink).is_err());
    }
}
