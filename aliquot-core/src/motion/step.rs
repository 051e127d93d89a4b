//! Per-node move descriptors
//!
//! A step parameter describes what one node does during one barrier point of
//! a move group. All values are physical units; conversion to wire integers
//! happens in [`super::encode`].

use aliquot_protocol::{StopCondition, TipAction};

/// Constant-acceleration move along one axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinearMove {
    /// Move duration in seconds
    pub duration_s: f64,
    /// Starting velocity in mm/s (signed, sets direction)
    pub velocity_mm_s: f64,
    /// Acceleration in mm/s²
    pub acceleration_mm_s2: f64,
    /// Condition that may end the move early
    pub stop_condition: StopCondition,
}

/// Move toward the axis limit switch
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HomeMove {
    /// Maximum time to search for the switch
    pub duration_s: f64,
    /// Search velocity in mm/s
    pub velocity_mm_s: f64,
}

/// Brushed gripper jaw move
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GripperMove {
    pub duration_s: f64,
    /// PWM duty cycle, 0-100 %
    pub duty_cycle: f64,
    /// Target jaw encoder position in mm
    pub encoder_position_mm: f64,
    /// Keep the jaw powered after the move
    pub stay_engaged: bool,
    pub stop_condition: StopCondition,
}

/// Gear-motor tip pick-up or drop on a multi-channel pipette
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipActionMove {
    pub duration_s: f64,
    pub velocity_mm_s: f64,
    pub action: TipAction,
    pub stop_condition: StopCondition,
}

/// What a single node does during one step
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepParameters {
    LinearMove(LinearMove),
    HomeMove(HomeMove),
    GripperMove(GripperMove),
    TipActionMove(TipActionMove),
}

impl StepParameters {
    /// Linear move at constant velocity that runs its full duration
    pub fn linear(duration_s: f64, velocity_mm_s: f64) -> Self {
        StepParameters::LinearMove(LinearMove {
            duration_s,
            velocity_mm_s,
            acceleration_mm_s2: 0.0,
            stop_condition: StopCondition::None,
        })
    }

    /// Linear move with acceleration and a stop condition
    pub fn linear_with(
        duration_s: f64,
        velocity_mm_s: f64,
        acceleration_mm_s2: f64,
        stop_condition: StopCondition,
    ) -> Self {
        StepParameters::LinearMove(LinearMove {
            duration_s,
            velocity_mm_s,
            acceleration_mm_s2,
            stop_condition,
        })
    }

    /// Homing move
    pub fn home(duration_s: f64, velocity_mm_s: f64) -> Self {
        StepParameters::HomeMove(HomeMove {
            duration_s,
            velocity_mm_s,
        })
    }

    /// Duration in seconds
    pub fn duration_s(&self) -> f64 {
        match self {
            StepParameters::LinearMove(m) => m.duration_s,
            StepParameters::HomeMove(m) => m.duration_s,
            StepParameters::GripperMove(m) => m.duration_s,
            StepParameters::TipActionMove(m) => m.duration_s,
        }
    }

    /// Stop condition; homing always ends on the limit switch
    pub fn stop_condition(&self) -> StopCondition {
        match self {
            StepParameters::LinearMove(m) => m.stop_condition,
            StepParameters::HomeMove(_) => StopCondition::LimitSwitch,
            StepParameters::GripperMove(m) => m.stop_condition,
            StepParameters::TipActionMove(m) => m.stop_condition,
        }
    }
}
