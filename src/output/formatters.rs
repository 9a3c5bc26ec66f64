use chrono::{DateTime, Utc};
use std::str::FromStr;

use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "console" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ModbusError::ConfigError(format!("unknown output format: {}", other))),
        }
    }
}

impl OutputFormat {
    pub fn format_value(&self, key: &str, value: i64, timestamp: DateTime<Utc>) -> String {
        match self {
            OutputFormat::Text => format!("{} {} = {}", timestamp.format("%Y-%m-%d %H:%M:%S"), key, value),
            OutputFormat::Json => serde_json::json!({
                "key": key,
                "value": value,
                "timestamp": timestamp.to_rfc3339(),
            })
            .to_string(),
        }
    }
}
