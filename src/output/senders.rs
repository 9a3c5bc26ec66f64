use async_trait::async_trait;
use chrono::Utc;
use log::info;
use std::io::Write;
use thiserror::Error;

use super::formatters::OutputFormat;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink not ready")]
    NotReady,

    #[error("Write of '{key}' failed: {reason}")]
    WriteFailed { key: String, reason: String },
}

/// Downstream consumer of validated readings.
///
/// Readiness is polled rather than signalled, and every write reports its own
/// outcome so one failed key never hides another.
#[async_trait]
pub trait ReadingSink: Send {
    fn is_ready(&self) -> bool;

    async fn write_value(&mut self, key: &str, value: i64) -> Result<(), SinkError>;

    /// Background upkeep of the sink's session, run between polls.
    async fn maintain(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn sink_type(&self) -> &str;
    fn destination(&self) -> &str;
}

#[async_trait]
impl<S: ReadingSink + ?Sized> ReadingSink for Box<S> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    async fn write_value(&mut self, key: &str, value: i64) -> Result<(), SinkError> {
        (**self).write_value(key, value).await
    }

    async fn maintain(&mut self) -> Result<(), SinkError> {
        (**self).maintain().await
    }

    fn sink_type(&self) -> &str {
        (**self).sink_type()
    }

    fn destination(&self) -> &str {
        (**self).destination()
    }
}

/// Writes each value as one line to stdout, or any other writer.
pub struct ConsoleSink {
    format: OutputFormat,
    out: Box<dyn Write + Send>,
    destination: String,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        info!("📤 Console sink ({:?})", format);
        Self::with_writer(format, Box::new(std::io::stdout()), "stdout")
    }

    pub fn with_writer(format: OutputFormat, out: Box<dyn Write + Send>, destination: &str) -> Self {
        Self {
            format,
            out,
            destination: destination.to_string(),
        }
    }
}

#[async_trait]
impl ReadingSink for ConsoleSink {
    fn is_ready(&self) -> bool {
        true
    }

    async fn write_value(&mut self, key: &str, value: i64) -> Result<(), SinkError> {
        let line = self.format.format_value(key, value, Utc::now());
        writeln!(self.out, "{}", line)
            .and_then(|_| self.out.flush())
            .map_err(|e| SinkError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn sink_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_console_sink_json_lines() {
        let buf = SharedBuf::default();
        let mut sink = ConsoleSink::with_writer(OutputFormat::Json, Box::new(buf.clone()), "memory");
        assert!(sink.is_ready());

        sink.write_value("nitrogen", 32).await.unwrap();
        sink.write_value("phosphorus", 21).await.unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["key"], "nitrogen");
        assert_eq!(first["value"], 32);
        assert_eq!(sink.destination(), "memory");
    }

    #[tokio::test]
    async fn test_console_sink_reports_write_failure() {
        let mut sink = ConsoleSink::with_writer(OutputFormat::Text, Box::new(BrokenPipe), "closed");
        let err = sink.write_value("potassium", 64).await.unwrap_err();
        assert!(matches!(err, SinkError::WriteFailed { ref key, .. } if key == "potassium"));
    }
}
