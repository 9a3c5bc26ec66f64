use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use npk_rtu::bus::{DirectionController, Fault, OutputLine, SimulatedSensor, Transport};
use npk_rtu::config::Config;
use npk_rtu::modbus::{MasterOptions, ModbusClientTrait, RtuMaster};
use npk_rtu::output::{ReadingSink, SinkError};
use npk_rtu::utils::error::{ErrorKind, ModbusError};
use npk_rtu::{PollService, SoilSensor};

/// Electrical state of the transceiver enables, shared by lines and transport.
#[derive(Default)]
struct Transceiver {
    driver: bool,
    receiver: bool,
    overlaps: usize,
    events: Vec<&'static str>,
}

type Shared = Arc<Mutex<Transceiver>>;

struct Line {
    driver: bool,
    state: Shared,
}

impl OutputLine for Line {
    fn set_active(&mut self, active: bool) -> Result<(), ModbusError> {
        let mut t = self.state.lock().unwrap();
        if self.driver {
            t.driver = active;
            t.events.push(if active { "de+" } else { "de-" });
        } else {
            t.receiver = active;
            t.events.push(if active { "re+" } else { "re-" });
        }
        if t.driver && t.receiver {
            t.overlaps += 1;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "test".to_string()
    }
}

/// Wraps the simulated sensor and checks the driver is on while writing.
struct Probe {
    inner: SimulatedSensor,
    state: Shared,
    fail_write: bool,
}

impl Transport for Probe {
    fn bytes_available(&mut self) -> Result<usize, ModbusError> {
        self.inner.bytes_available()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ModbusError> {
        self.inner.read_exact(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        let mut t = self.state.lock().unwrap();
        assert!(t.driver && !t.receiver, "write outside the transmit bracket");
        t.events.push("write");
        drop(t);
        if self.fail_write {
            return Err(ModbusError::CommunicationError("Write failed: cable unplugged".into()));
        }
        self.inner.write_all(bytes)
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        self.state.lock().unwrap().events.push("flush");
        self.inner.flush()
    }

    fn discard_input(&mut self) -> Result<usize, ModbusError> {
        self.inner.discard_input()
    }
}

fn master(sensor: SimulatedSensor, fail_write: bool) -> (RtuMaster<Probe>, Shared) {
    let state = Shared::default();
    let direction = DirectionController::new(
        Box::new(Line { driver: true, state: state.clone() }),
        Some(Box::new(Line { driver: false, state: state.clone() })),
        Duration::from_micros(100),
    );
    let probe = Probe { inner: sensor, state: state.clone(), fail_write };
    let options = MasterOptions {
        timeout: Duration::from_millis(80),
        poll_step: Duration::from_millis(1),
        resync_input: true,
    };
    (RtuMaster::new(probe, direction, options).unwrap(), state)
}

fn npk_sensor() -> SimulatedSensor {
    SimulatedSensor::new(1, 0x001E, vec![32, 21, 64]).with_response_delay(Duration::from_millis(3))
}

#[tokio::test]
async fn transmit_bracket_surrounds_every_write() {
    let (mut master, state) = master(npk_sensor(), false);
    let values = master.read_holding_registers(1, 0x001E, 3).await.unwrap();
    assert_eq!(values, vec![32, 21, 64]);

    let t = state.lock().unwrap();
    assert_eq!(t.overlaps, 0);
    assert_eq!(
        t.events,
        vec!["de-", "re+", "re-", "de+", "write", "flush", "de-", "re+"]
    );
    assert!(!t.driver && t.receiver);
}

#[tokio::test]
async fn failed_write_still_releases_the_bus() {
    let (mut master, state) = master(npk_sensor(), true);
    let result = master.read_holding_registers(1, 0x001E, 3).await;
    assert!(matches!(result, Err(ModbusError::CommunicationError(_))));

    let t = state.lock().unwrap();
    assert!(!t.driver, "driver left enabled after error");
    assert!(t.receiver);
    assert_eq!(t.events.last(), Some(&"re+"));
}

#[tokio::test]
async fn repeated_polls_are_identical() {
    let (mut master, _) = master(npk_sensor(), false);
    let first = master.read_holding_registers(1, 0x001E, 3).await.unwrap();
    let second = master.read_holding_registers(1, 0x001E, 3).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(master.transport().inner.requests().len(), 2);
    assert_eq!(master.transport().inner.requests()[0], master.transport().inner.requests()[1]);
}

#[tokio::test]
async fn round_trip_recovers_arbitrary_register_values() {
    let values = vec![0x0000, 0xFFFF, 0x1234, 0x8001, 0x00FF];
    let sensor = SimulatedSensor::new(0x11, 0x0100, values.clone()).with_response_delay(Duration::ZERO);
    let (mut master, _) = master(sensor, false);
    assert_eq!(master.read_holding_registers(0x11, 0x0100, 5).await.unwrap(), values);
    assert_eq!(master.read_holding_registers(0x11, 0x0102, 2).await.unwrap(), vec![0x1234, 0x8001]);
}

#[tokio::test]
async fn silent_sensor_times_out_within_deadline() {
    let mut sensor = npk_sensor();
    sensor.set_fault(Some(Fault::Silent));
    let (mut master, _) = master(sensor, false);

    let started = Instant::now();
    let result = master.read_holding_registers(1, 0x001E, 3).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(ModbusError::Timeout { expected: 11, received: 0 })));
    assert!(elapsed < Duration::from_millis(80 + 150), "blocked for {:?}", elapsed);
}

#[tokio::test]
async fn exception_reply_is_a_timeout_for_short_frames() {
    // A 5-byte exception never reaches the 11 bytes a 3-register reply needs.
    let (mut master, _) = master(npk_sensor(), false);
    let result = master.read_holding_registers(1, 0x0040, 3).await;
    assert!(matches!(result, Err(ModbusError::Timeout { expected: 11, received: 5 })));
    assert_eq!(master.transport().inner.pending_input(), 0, "resync drops the exception");
}

#[tokio::test]
async fn noise_is_recovered_on_the_next_poll() {
    let mut sensor = npk_sensor();
    sensor.set_fault(Some(Fault::Noise(vec![0xAA])));
    let (mut master, _) = master(sensor, false);

    assert!(matches!(
        master.read_holding_registers(1, 0x001E, 3).await,
        Err(ModbusError::HeaderMismatch { slave: 0xAA, .. })
    ));

    master.transport_mut().inner.set_fault(None);
    assert_eq!(master.read_holding_registers(1, 0x001E, 3).await.unwrap(), vec![32, 21, 64]);
}

#[derive(Default)]
struct CollectingSink {
    written: Vec<(String, i64)>,
}

#[async_trait]
impl ReadingSink for CollectingSink {
    fn is_ready(&self) -> bool {
        true
    }

    async fn write_value(&mut self, key: &str, value: i64) -> Result<(), SinkError> {
        self.written.push((key.to_string(), value));
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "collect"
    }

    fn destination(&self) -> &str {
        "memory"
    }
}

#[tokio::test]
async fn poll_service_over_the_wire() {
    let config = Config::default();
    let sensor = SoilSensor::new(&config.register_map, &config.sink).unwrap();
    let (master, state) = master(npk_sensor(), false);
    let mut service = PollService::new(master, CollectingSink::default(), sensor, config.polling.clone());

    let reading = service.run_cycle().await;
    assert!(reading.valid);
    assert_eq!(
        service.sink().written,
        vec![
            ("nitrogen".to_string(), 32),
            ("phosphorus".to_string(), 21),
            ("potassium".to_string(), 64),
        ]
    );

    service.client_mut().transport_mut().inner.set_fault(Some(Fault::CorruptCrc));
    let reading = service.run_cycle().await;
    assert!(!reading.valid);
    assert_eq!(reading.error, Some(ErrorKind::CrcMismatch));
    assert_eq!(service.sink().written.len(), 3);
    assert_eq!(state.lock().unwrap().overlaps, 0);
}
