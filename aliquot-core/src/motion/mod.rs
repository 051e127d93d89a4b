//! Move descriptor model
//!
//! Typed per-node steps, the groups that batch them, and the encoder that
//! turns a step into a staging request.

pub mod encode;
pub mod group;
pub mod step;

pub use encode::{decode, encode, EncodingError, WireField};
pub use group::{
    GroupError, MoveGroup, MoveGroupStep, MAX_GROUPS, MAX_MOVES_PER_GROUP, MAX_NODES,
    MAX_STEPS_PER_GROUP,
};
pub use step::{GripperMove, HomeMove, LinearMove, StepParameters, TipActionMove};
