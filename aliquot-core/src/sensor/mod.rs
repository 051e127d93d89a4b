//! Sensor requests
//!
//! Poll, write, threshold and output-binding exchanges with node sensors.

pub mod scheduler;

pub use scheduler::{SensorError, SensorScheduler, SensorValue};
