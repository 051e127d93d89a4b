//! Motion bus wire protocol
//!
//! This crate defines the CAN messages exchanged between the host and the
//! motor-controller nodes of the liquid handler. It is the bit-level contract
//! with node firmware and has no knowledge of how moves are scheduled.
//!
//! # Protocol Overview
//!
//! Every message is one CAN-FD frame with a 29-bit extended identifier:
//! ```text
//! ┌────────────┬──────────────────┬──────────┬───────────────┐
//! │ MESSAGE ID │ ORIGINATING NODE │ NODE     │ FUNCTION CODE │
//! │ 11 bits    │ 7 bits           │ 7 bits   │ 4 bits        │
//! └────────────┴──────────────────┴──────────┴───────────────┘
//! ```
//!
//! Payloads are big-endian. Physical quantities are carried in fixed point,
//! see [`fixed_point`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod fault;
pub mod fixed_point;
pub mod frame;
pub mod messages;
pub mod node;

pub use fault::{ErrorCode, ErrorSeverity};
pub use frame::{ArbitrationId, CanFrame, FrameError, MAX_PAYLOAD_SIZE};
pub use messages::{
    AckKind, CancelTrigger, Incoming, PositionFlags, Request, Response, SensorId,
    SensorOutputBinding, SensorThresholdMode, SensorType, StartTrigger, StopCondition, TipAction,
};
pub use node::NodeId;
