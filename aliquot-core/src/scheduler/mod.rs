//! Move group scheduling
//!
//! Stages move groups on the nodes, triggers them in order, and reduces the
//! nodes' completion reports to one final record per node.

pub mod accumulator;
pub mod dispatcher;
pub mod error;
pub mod pending;

pub use accumulator::{reduce, Accumulator, CompletionRecord, MotorPositionStatus, MAX_WARNINGS};
pub use dispatcher::{
    DispatchOutcome, MoveDispatcher, NodeWarning, PreparedHandle, MAX_DISPATCH_WARNINGS,
};
pub use error::DispatchError;
pub use pending::{GroupExecutionState, GroupPlan, MovePairs, Progress};
