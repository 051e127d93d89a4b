//! Dispatch errors

use aliquot_protocol::{ErrorCode, ErrorSeverity, NodeId};

use super::pending::MovePairs;
use crate::motion::EncodingError;
use crate::traits::TransportError;

/// Why a dispatch failed
///
/// Every variant raised while a group runs names the group and the
/// (node, sequence) pairs that were still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchError {
    /// A step could not be encoded; nothing was sent
    Encoding {
        group: u8,
        seq: u8,
        node: NodeId,
        error: EncodingError,
    },
    /// The transport refused a frame
    Transport {
        /// `None` while staging
        group: Option<u8>,
        error: TransportError,
    },
    /// A limit-switch group ended without every node reaching its switch
    ///
    /// Nothing was stopped; retrying the homing move is legitimate.
    ConditionNotMet { group: u8, pending: MovePairs },
    /// A node reported a fault that ends the dispatch
    HardwareFault {
        group: u8,
        node: NodeId,
        code: ErrorCode,
        severity: ErrorSeverity,
        pending: MovePairs,
    },
    /// Emergency stop pressed
    EstopActivated {
        group: u8,
        node: NodeId,
        pending: MovePairs,
    },
    /// Nodes never acknowledged within the group timeout
    Timeout { group: u8, pending: MovePairs },
    /// The abort signal fired
    Cancelled { group: u8, pending: MovePairs },
    /// More groups than a dispatch can carry
    CapacityExceeded,
    /// No listener slot free on the bus hub
    ListenerUnavailable,
}

impl DispatchError {
    /// Group that was running, if any
    pub fn group(&self) -> Option<u8> {
        match self {
            DispatchError::Encoding { group, .. }
            | DispatchError::ConditionNotMet { group, .. }
            | DispatchError::HardwareFault { group, .. }
            | DispatchError::EstopActivated { group, .. }
            | DispatchError::Timeout { group, .. }
            | DispatchError::Cancelled { group, .. } => Some(*group),
            DispatchError::Transport { group, .. } => *group,
            DispatchError::CapacityExceeded | DispatchError::ListenerUnavailable => None,
        }
    }

    /// Pairs that were outstanding when the dispatch failed
    pub fn pending(&self) -> &[(NodeId, u8)] {
        match self {
            DispatchError::ConditionNotMet { pending, .. }
            | DispatchError::HardwareFault { pending, .. }
            | DispatchError::EstopActivated { pending, .. }
            | DispatchError::Timeout { pending, .. }
            | DispatchError::Cancelled { pending, .. } => pending.as_slice(),
            _ => &[],
        }
    }

    /// Returns true if the caller may simply retry
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DispatchError::ConditionNotMet { .. })
    }
}

impl core::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DispatchError::Encoding {
                group,
                seq,
                node,
                error,
            } => write!(f, "group {} seq {} for {:?}: {}", group, seq, node, error),
            DispatchError::Transport {
                group: Some(group),
                error,
            } => write!(f, "transport error in group {}: {}", group, error),
            DispatchError::Transport { group: None, error } => {
                write!(f, "transport error while staging: {}", error)
            }
            DispatchError::ConditionNotMet { group, pending } => write!(
                f,
                "group {} stop condition not met by {} moves",
                group,
                pending.len()
            ),
            DispatchError::HardwareFault {
                group,
                node,
                code,
                severity,
                ..
            } => write!(
                f,
                "{:?} fault {:?} from {:?} in group {}",
                severity, code, node, group
            ),
            DispatchError::EstopActivated { group, node, .. } => {
                write!(f, "estop reported by {:?} in group {}", node, group)
            }
            DispatchError::Timeout { group, pending } => write!(
                f,
                "group {} timed out with {} moves outstanding",
                group,
                pending.len()
            ),
            DispatchError::Cancelled { group, .. } => write!(f, "cancelled in group {}", group),
            DispatchError::CapacityExceeded => write!(f, "too many move groups"),
            DispatchError::ListenerUnavailable => write!(f, "no listener slot available"),
        }
    }
}
