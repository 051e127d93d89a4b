//! Step encoding
//!
//! Converts [`StepParameters`] into the staging request a node understands,
//! and back. Encoding is pure: a failure here happens before anything is
//! put on the bus.

use aliquot_protocol::fixed_point::{
    acceleration_to_fixed, duration_to_ticks, fixed_to_acceleration, fixed_to_velocity, mm_to_um,
    ticks_to_duration, um_to_mm, velocity_to_fixed, ScaleError,
};
use aliquot_protocol::Request;

use super::step::{GripperMove, HomeMove, LinearMove, StepParameters, TipActionMove};

/// Wire field that failed to encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireField {
    Duration,
    Velocity,
    Acceleration,
    DutyCycle,
    EncoderPosition,
}

/// A physical parameter that has no wire representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodingError {
    /// Scaled value does not fit the wire integer
    Overflow { field: WireField },
    /// Value is negative where it must not be, or not finite
    InvalidParameter { field: WireField },
}

impl core::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EncodingError::Overflow { field } => write!(f, "{:?} overflows its wire field", field),
            EncodingError::InvalidParameter { field } => write!(f, "invalid {:?}", field),
        }
    }
}

fn scaled<T>(field: WireField, result: Result<T, ScaleError>) -> Result<T, EncodingError> {
    result.map_err(|e| match e {
        ScaleError::Overflow => EncodingError::Overflow { field },
        ScaleError::NotFinite | ScaleError::Negative => EncodingError::InvalidParameter { field },
    })
}

/// Upper bound of the gripper PWM duty cycle
const MAX_DUTY_CYCLE: f64 = 100.0;

/// Build the staging request for one node's step
pub fn encode(
    params: &StepParameters,
    group_id: u8,
    seq_id: u8,
    interrupts_per_sec: u32,
) -> Result<Request, EncodingError> {
    let ips = interrupts_per_sec;
    let duration = scaled(
        WireField::Duration,
        duration_to_ticks(params.duration_s(), ips),
    )?;

    let request = match *params {
        StepParameters::LinearMove(m) => Request::AddLinearMove {
            group_id,
            seq_id,
            duration,
            velocity: scaled(WireField::Velocity, velocity_to_fixed(m.velocity_mm_s, ips))?,
            acceleration: scaled(
                WireField::Acceleration,
                acceleration_to_fixed(m.acceleration_mm_s2, ips),
            )?,
            stop_condition: m.stop_condition,
        },
        StepParameters::HomeMove(m) => Request::HomeRequest {
            group_id,
            seq_id,
            duration,
            velocity: scaled(WireField::Velocity, velocity_to_fixed(m.velocity_mm_s, ips))?,
        },
        StepParameters::GripperMove(m) => {
            if !m.duty_cycle.is_finite() || !(0.0..=MAX_DUTY_CYCLE).contains(&m.duty_cycle) {
                return Err(EncodingError::InvalidParameter {
                    field: WireField::DutyCycle,
                });
            }
            Request::GripperMove {
                group_id,
                seq_id,
                duration,
                // In range, so the truncating cast is exact after rounding
                duty_cycle: (m.duty_cycle + 0.5) as u32,
                encoder_position_um: scaled(
                    WireField::EncoderPosition,
                    mm_to_um(m.encoder_position_mm),
                )?,
                stay_engaged: m.stay_engaged,
                stop_condition: m.stop_condition,
            }
        }
        StepParameters::TipActionMove(m) => Request::TipAction {
            group_id,
            seq_id,
            duration,
            velocity: scaled(WireField::Velocity, velocity_to_fixed(m.velocity_mm_s, ips))?,
            action: m.action,
            stop_condition: m.stop_condition,
        },
    };
    Ok(request)
}

/// Recover physical step parameters from a staging request
///
/// Returns `None` for requests that do not stage a move.
pub fn decode(request: &Request, interrupts_per_sec: u32) -> Option<StepParameters> {
    let ips = interrupts_per_sec;
    match *request {
        Request::AddLinearMove {
            duration,
            velocity,
            acceleration,
            stop_condition,
            ..
        } => Some(StepParameters::LinearMove(LinearMove {
            duration_s: ticks_to_duration(duration, ips),
            velocity_mm_s: fixed_to_velocity(velocity, ips),
            acceleration_mm_s2: fixed_to_acceleration(acceleration, ips),
            stop_condition,
        })),
        Request::HomeRequest {
            duration, velocity, ..
        } => Some(StepParameters::HomeMove(HomeMove {
            duration_s: ticks_to_duration(duration, ips),
            velocity_mm_s: fixed_to_velocity(velocity, ips),
        })),
        Request::GripperMove {
            duration,
            duty_cycle,
            encoder_position_um,
            stay_engaged,
            stop_condition,
            ..
        } => Some(StepParameters::GripperMove(GripperMove {
            duration_s: ticks_to_duration(duration, ips),
            duty_cycle: duty_cycle as f64,
            encoder_position_mm: um_to_mm(encoder_position_um),
            stay_engaged,
            stop_condition,
        })),
        Request::TipAction {
            duration,
            velocity,
            action,
            stop_condition,
            ..
        } => Some(StepParameters::TipActionMove(TipActionMove {
            duration_s: ticks_to_duration(duration, ips),
            velocity_mm_s: fixed_to_velocity(velocity, ips),
            action,
            stop_condition,
        })),
        _ => None,
    }
}
