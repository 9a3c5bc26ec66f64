use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::PollingConfig;
use crate::devices::SoilSensor;
use crate::modbus::{ModbusClientTrait, Reading};
use crate::output::{ReadingSink, SinkError};
use crate::utils::error::ErrorKind;

/// Running counters for the monitor loop.
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    pub successful: u64,
    pub failed: HashMap<ErrorKind, u64>,
    pub published: u64,
    pub sink_failures: u64,
    pub skipped_not_ready: u64,
}

impl PollStats {
    pub fn record(&mut self, reading: &Reading) {
        match reading.error {
            None if reading.valid => self.successful += 1,
            Some(kind) => *self.failed.entry(kind).or_default() += 1,
            None => *self.failed.entry(ErrorKind::Other).or_default() += 1,
        }
    }

    pub fn failed_total(&self) -> u64 {
        self.failed.values().sum()
    }

    pub fn total(&self) -> u64 {
        self.successful + self.failed_total()
    }

    pub fn success_rate(&self) -> f32 {
        if self.total() == 0 {
            return 0.0;
        }
        (self.successful as f32 / self.total() as f32) * 100.0
    }

    pub fn log_summary(&self) {
        info!(
            "📈 Success rate: {:.1}% ({}/{})",
            self.success_rate(),
            self.successful,
            self.total()
        );
        if !self.failed.is_empty() {
            let mut kinds: Vec<String> = self.failed.iter().map(|(k, n)| format!("{:?}={}", k, n)).collect();
            kinds.sort();
            info!("   ❌ Failures: {}", kinds.join(", "));
        }
        if self.sink_failures > 0 || self.skipped_not_ready > 0 {
            info!(
                "   📤 Sink: {} written, {} failed, {} cycles skipped (not ready)",
                self.published, self.sink_failures, self.skipped_not_ready
            );
        }
    }
}

/// Outcome of handing one reading to the sink.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    pub written: usize,
    pub failed: Vec<String>,
}

/// Drives one request/response cycle per tick and forwards valid readings.
pub struct PollService<C: ModbusClientTrait, S: ReadingSink> {
    client: C,
    sink: S,
    sensor: SoilSensor,
    polling: PollingConfig,
    stats: PollStats,
}

impl<C: ModbusClientTrait, S: ReadingSink> PollService<C, S> {
    pub fn new(client: C, sink: S, sensor: SoilSensor, polling: PollingConfig) -> Self {
        info!(
            "🚀 Poll service: slave {} registers 0x{:04X}+{} every {} ms -> {}({})",
            sensor.address,
            sensor.start_register,
            sensor.register_count,
            polling.interval_ms,
            sink.sink_type(),
            sink.destination()
        );
        Self {
            client,
            sink,
            sensor,
            polling,
            stats: PollStats::default(),
        }
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sensor(&self) -> &SoilSensor {
        &self.sensor
    }

    /// One transaction. Never fails: errors become an invalid reading.
    pub async fn poll_once(&mut self) -> Reading {
        let sensor = &self.sensor;
        let result = match sensor.request() {
            Ok(request) => {
                self.client
                    .read_holding_registers(request.slave_address, request.start_register, request.register_count)
                    .await
            }
            Err(e) => Err(e),
        };

        let reading = match result {
            Ok(values) => Reading::valid(values),
            Err(e) => {
                warn!("⚠️ Poll of device {} failed: {}", sensor.address, e);
                Reading::invalid(e.kind())
            }
        };

        if let Some(labelled) = sensor.label(&reading) {
            info!("✅ {}", labelled);
        }
        self.stats.record(&reading);
        reading
    }

    /// Writes every value of a valid reading under its key. Each write is
    /// independent; failures are collected, not propagated.
    pub async fn publish(&mut self, reading: &Reading) -> Result<PublishSummary, SinkError> {
        if !self.sink.is_ready() {
            return Err(SinkError::NotReady);
        }

        let mut summary = PublishSummary::default();
        for (key, value) in self.sensor.keys.iter().zip(reading.values.iter()) {
            match self.sink.write_value(key, i64::from(*value)).await {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    error!("❌ Failed to send {} via {}: {}", key, self.sink.sink_type(), e);
                    summary.failed.push(key.clone());
                }
            }
        }

        self.stats.published += summary.written as u64;
        self.stats.sink_failures += summary.failed.len() as u64;
        Ok(summary)
    }

    /// Poll, then hand off if the reading is valid and the sink is ready.
    /// Invalid readings are dropped; the next tick is the retry.
    pub async fn run_cycle(&mut self) -> Reading {
        let reading = self.poll_once().await;
        if !reading.valid {
            debug!("Skipping hand-off for invalid reading");
            return reading;
        }

        match self.publish(&reading).await {
            Ok(summary) if summary.failed.is_empty() => {
                debug!("📤 Published {} values", summary.written);
            }
            Ok(summary) => {
                warn!("⚠️ Published {} values, failed: {}", summary.written, summary.failed.join(", "));
            }
            Err(SinkError::NotReady) => {
                self.stats.skipped_not_ready += 1;
                debug!("Sink not ready, dropping reading");
            }
            Err(e) => error!("❌ Sink error: {}", e),
        }
        reading
    }

    /// Cooperative loop: polling and sink upkeep share one task until
    /// `shutdown` resolves.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        let mut poll_timer = interval(Duration::from_millis(self.polling.interval_ms));
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut maintain_timer = interval(Duration::from_millis(self.polling.maintenance_interval_ms));
        maintain_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("🔄 Starting soil sensor monitoring, press Ctrl+C to stop");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Stopping soil sensor monitor...");
                    break;
                }
                _ = maintain_timer.tick() => {
                    if let Err(e) = self.sink.maintain().await {
                        warn!("⚠️ Sink maintenance failed: {}", e);
                    }
                }
                _ = poll_timer.tick() => {
                    self.run_cycle().await;
                    let every = self.polling.stats_every;
                    if every > 0 && self.stats.total() % every == 0 {
                        self.stats.log_summary();
                    }
                }
            }
        }

        info!("📊 Final Statistics:");
        self.stats.log_summary();
    }
}
