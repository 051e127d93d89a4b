//! Fault policy
//!
//! Nodes report faults asynchronously with an [`ErrorMessage`]. Every
//! decision about what such a report does to a running dispatch is made
//! here, in one table.
//!
//! [`ErrorMessage`]: aliquot_protocol::Response::ErrorMessage

use aliquot_protocol::{ErrorCode, ErrorSeverity};

/// What a fault report does to a running dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultAction {
    /// Stop every node and fail the dispatch, whichever group is running
    AbortAll,
    /// Fail the running group if the reporting node takes part in it
    AbortGroup,
    /// Keep going; report the fault alongside the node's result
    AttachToNode,
}

impl FaultAction {
    /// Returns true if the dispatch cannot continue
    pub fn is_fatal(self) -> bool {
        !matches!(self, FaultAction::AttachToNode)
    }
}

/// Classify a fault report
pub fn classify(code: ErrorCode, severity: ErrorSeverity) -> FaultAction {
    use ErrorCode::*;

    match (code, severity) {
        (EstopDetected, _) => FaultAction::AbortAll,
        (_, ErrorSeverity::Unrecoverable) => FaultAction::AbortAll,
        (_, ErrorSeverity::Warning) => FaultAction::AttachToNode,
        (
            CollisionDetected | OverPressure | LabwareDropped | MotorDriverError
            | SafetyRelayInactive | DoorOpen,
            ErrorSeverity::Recoverable,
        ) => FaultAction::AbortGroup,
        (_, ErrorSeverity::Recoverable) => FaultAction::AttachToNode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estop_always_aborts_all() {
        for severity in [
            ErrorSeverity::Warning,
            ErrorSeverity::Recoverable,
            ErrorSeverity::Unrecoverable,
        ] {
            assert_eq!(
                classify(ErrorCode::EstopDetected, severity),
                FaultAction::AbortAll
            );
        }
    }

    #[test]
    fn test_unrecoverable_aborts_all() {
        assert_eq!(
            classify(ErrorCode::MotorBusy, ErrorSeverity::Unrecoverable),
            FaultAction::AbortAll
        );
        assert_eq!(
            classify(ErrorCode::Unknown(0x0F00), ErrorSeverity::Unrecoverable),
            FaultAction::AbortAll
        );
    }

    #[test]
    fn test_recoverable_motion_faults_abort_group() {
        for code in [
            ErrorCode::CollisionDetected,
            ErrorCode::OverPressure,
            ErrorCode::LabwareDropped,
            ErrorCode::MotorDriverError,
        ] {
            assert_eq!(
                classify(code, ErrorSeverity::Recoverable),
                FaultAction::AbortGroup
            );
        }
    }

    #[test]
    fn test_soft_faults_attach() {
        assert_eq!(
            classify(ErrorCode::CollisionDetected, ErrorSeverity::Warning),
            FaultAction::AttachToNode
        );
        assert_eq!(
            classify(ErrorCode::MotorBusy, ErrorSeverity::Recoverable),
            FaultAction::AttachToNode
        );
        assert!(!FaultAction::AttachToNode.is_fatal());
        assert!(FaultAction::AbortGroup.is_fatal());
    }
}
