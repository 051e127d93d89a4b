//! Safety handling
//!
//! Classification of node fault reports and the abort signal used for
//! emergency stop and user cancel.

pub mod abort;
pub mod policy;

pub use abort::AbortSignal;
pub use policy::{classify, FaultAction};
