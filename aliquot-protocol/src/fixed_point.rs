//! Fixed-point scaling between physical units and wire integers
//!
//! Motor controllers step on a fixed interrupt clock. Durations travel as
//! interrupt ticks, velocities as millimetres per tick and accelerations as
//! millimetres per tick², both in Q31 so sub-micron increments survive a
//! 32-bit field. Positions travel as signed micrometres, sensor values as
//! Q16.

/// Default motor interrupt rate (interrupts per second)
pub const DEFAULT_INTERRUPTS_PER_SEC: u32 = 170_000;

/// Q31 scale for velocity and acceleration
pub const Q31_SCALE: f64 = 2_147_483_648.0;

/// Q16 scale for sensor values
pub const Q16_SCALE: f64 = 65_536.0;

/// Micrometres per millimetre
const UM_PER_MM: f64 = 1000.0;

/// Reasons a physical value cannot be scaled onto the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScaleError {
    /// Input was NaN or infinite
    NotFinite,
    /// Input must not be negative
    Negative,
    /// Scaled result does not fit in the wire field
    Overflow,
}

/// Round half away from zero
///
/// `core` has no float rounding; the cast saturates, which the range checks
/// below rely on.
fn round(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5) as i64
    } else {
        (value - 0.5) as i64
    }
}

fn checked_i32(value: f64) -> Result<i32, ScaleError> {
    if !value.is_finite() {
        return Err(ScaleError::NotFinite);
    }
    i32::try_from(round(value)).map_err(|_| ScaleError::Overflow)
}

/// Seconds to interrupt ticks
pub fn duration_to_ticks(duration_s: f64, interrupts_per_sec: u32) -> Result<u32, ScaleError> {
    if !duration_s.is_finite() {
        return Err(ScaleError::NotFinite);
    }
    if duration_s < 0.0 {
        return Err(ScaleError::Negative);
    }
    u32::try_from(round(duration_s * interrupts_per_sec as f64)).map_err(|_| ScaleError::Overflow)
}

/// Interrupt ticks to seconds
pub fn ticks_to_duration(ticks: u32, interrupts_per_sec: u32) -> f64 {
    ticks as f64 / interrupts_per_sec as f64
}

/// mm/s to Q31 mm/tick
pub fn velocity_to_fixed(velocity_mm_s: f64, interrupts_per_sec: u32) -> Result<i32, ScaleError> {
    checked_i32(velocity_mm_s / interrupts_per_sec as f64 * Q31_SCALE)
}

/// Q31 mm/tick to mm/s
pub fn fixed_to_velocity(fixed: i32, interrupts_per_sec: u32) -> f64 {
    fixed as f64 / Q31_SCALE * interrupts_per_sec as f64
}

/// mm/s² to Q31 mm/tick²
pub fn acceleration_to_fixed(
    acceleration_mm_s2: f64,
    interrupts_per_sec: u32,
) -> Result<i32, ScaleError> {
    let ips = interrupts_per_sec as f64;
    checked_i32(acceleration_mm_s2 / (ips * ips) * Q31_SCALE)
}

/// Q31 mm/tick² to mm/s²
pub fn fixed_to_acceleration(fixed: i32, interrupts_per_sec: u32) -> f64 {
    let ips = interrupts_per_sec as f64;
    fixed as f64 / Q31_SCALE * ips * ips
}

/// Millimetres to signed micrometres
pub fn mm_to_um(position_mm: f64) -> Result<i32, ScaleError> {
    checked_i32(position_mm * UM_PER_MM)
}

/// Signed micrometres to millimetres
pub fn um_to_mm(position_um: i32) -> f64 {
    position_um as f64 / UM_PER_MM
}

/// Sensor reading to Q16
pub fn sensor_to_fixed(value: f64) -> Result<i32, ScaleError> {
    checked_i32(value * Q16_SCALE)
}

/// Q16 to sensor reading
pub fn fixed_to_sensor(fixed: i32) -> f64 {
    fixed as f64 / Q16_SCALE
}
