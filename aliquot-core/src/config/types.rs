//! Configuration type definitions
//!
//! These types tune how the host drives the motion bus. They are plain data
//! and can be loaded from any serde format when the `serde` feature is on.

use aliquot_protocol::fixed_point::DEFAULT_INTERRUPTS_PER_SEC;
use embassy_time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default multiplier applied to a group's expected duration
pub const DEFAULT_TIMEOUT_MARGIN: f64 = 1.1;

/// Default lower bound on a group timeout (ms)
///
/// Leaves room for bus latency on very short groups. Below roughly 60 ms of
/// expected duration the floor is longer than `1.5 * margin * duration`, so
/// a silent node of such a group is reported later than that bound.
pub const DEFAULT_MIN_TIMEOUT_MS: u64 = 100;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Timeout margin must be finite and at least 1.0
    InvalidTimeoutMargin,
    /// Interrupt rate must be non-zero
    InvalidInterruptRate,
    /// Sensor timeout must be non-zero
    InvalidSensorTimeout,
}

/// Move dispatch tuning
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DispatchConfig {
    /// Group timeout is the expected duration times this margin
    ///
    /// A tuning point: heavy bus traffic may need more headroom.
    pub timeout_margin: f64,
    /// Lower bound on any group timeout (ms)
    pub min_timeout_ms: u64,
    /// Motor interrupt rate used to scale durations and velocities
    pub interrupts_per_sec: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
            min_timeout_ms: DEFAULT_MIN_TIMEOUT_MS,
            interrupts_per_sec: DEFAULT_INTERRUPTS_PER_SEC,
        }
    }
}

impl DispatchConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.timeout_margin.is_finite() || self.timeout_margin < 1.0 {
            return Err(ConfigError::InvalidTimeoutMargin);
        }
        if self.interrupts_per_sec == 0 {
            return Err(ConfigError::InvalidInterruptRate);
        }
        Ok(())
    }

    /// Timeout for a group expected to take `duration_s`
    pub fn group_timeout(&self, duration_s: f64) -> Duration {
        let floor = Duration::from_millis(self.min_timeout_ms);
        let scaled_us = duration_s * self.timeout_margin * 1_000_000.0;
        // Saturating cast; NaN becomes zero and falls back to the floor
        let scaled = Duration::from_micros(scaled_us as u64);
        if scaled > floor {
            scaled
        } else {
            floor
        }
    }
}

/// Sensor exchange tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorConfig {
    /// Samples averaged by a baseline request
    pub baseline_samples: u16,
    /// Ask nodes for baseline-compensated readings
    pub offset_reading: bool,
    /// Timeout for exchanges without an explicit one (ms)
    pub timeout_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            baseline_samples: 10,
            offset_reading: true,
            timeout_ms: 1000,
        }
    }
}

impl SensorConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidSensorTimeout);
        }
        Ok(())
    }

    /// Default exchange timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
