pub mod soil_sensor;

pub use soil_sensor::{SoilReading, SoilSensor};
