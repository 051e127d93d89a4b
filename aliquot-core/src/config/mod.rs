//! Configuration types
//!
//! Board-agnostic tuning for move dispatch and sensor exchanges.

pub mod types;

pub use types::*;
