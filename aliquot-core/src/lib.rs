//! Host-side motion coordination for the liquid handler
//!
//! This crate contains the logic that drives the motor-controller nodes over
//! the shared CAN bus, independent of how frames reach the wire:
//!
//! - Transport trait and the message hub that fans out received frames
//! - Move group model and the encoder for staging requests
//! - Move dispatcher (stage, trigger, wait, reduce completions)
//! - Fault classification and the abort signal
//! - Sensor poll, threshold and output-binding exchanges
//! - Configuration type definitions

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible in every module
#[macro_use]
mod fmt;

pub mod config;
pub mod motion;
pub mod safety;
pub mod scheduler;
pub mod sensor;
pub mod traits;

#[cfg(test)]
mod sim;

pub use config::{ConfigError, DispatchConfig, SensorConfig};
pub use motion::{MoveGroup, MoveGroupStep, StepParameters};
pub use safety::AbortSignal;
pub use scheduler::{DispatchError, DispatchOutcome, MoveDispatcher};
pub use sensor::{SensorError, SensorScheduler};
pub use traits::{CanBus, MessageHub};
