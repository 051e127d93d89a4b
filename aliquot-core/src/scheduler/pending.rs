//! Per-group execution state
//!
//! [`GroupExecutionState`] tracks which (node, sequence) pairs of the running
//! group are still outstanding and decides, message by message, whether the
//! group is done. It does no I/O and knows nothing about time; the dispatcher
//! owns the wait and the timeout.

use heapless::Vec;

use aliquot_protocol::{AckKind, ErrorCode, ErrorSeverity, Incoming, NodeId, Response};

use super::accumulator::{Accumulator, CompletionRecord};
use crate::motion::{MoveGroup, MAX_MOVES_PER_GROUP, MAX_NODES};
use crate::safety::{classify, FaultAction};

/// (node, sequence) pairs of one group
pub type MovePairs = Vec<(NodeId, u8), MAX_MOVES_PER_GROUP>;

/// What prepare recorded about one group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlan {
    pub group_id: u8,
    /// Every staged (node, sequence) pair
    pub moves: MovePairs,
    /// Distinct nodes taking part
    pub nodes: Vec<NodeId, MAX_NODES>,
    /// Expected duration: longest move of each step, summed
    pub duration_s: f64,
    /// Every step ends on a limit switch
    pub limit_switch: bool,
}

impl GroupPlan {
    /// Plan a group staged under `group_id`
    pub fn new(group_id: u8, group: &MoveGroup) -> Self {
        let mut moves = MovePairs::new();
        for (seq_id, step) in group.steps().iter().enumerate() {
            for (node, _) in step.iter() {
                // Group capacity bounds the pair count
                let _ = moves.push((node, seq_id as u8));
            }
        }
        Self {
            group_id,
            moves,
            nodes: group.nodes(),
            duration_s: group.duration_s(),
            limit_switch: group.stops_on_limit_switch(),
        }
    }
}

/// Outcome of feeding one message to the group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// Not about this group
    Ignored,
    /// Acknowledged a pair; others remain
    Pending,
    /// Every pair acknowledged, or dropped because its node reached the
    /// limit switch
    Complete,
    /// Limit-switch group finished without every node reaching its switch
    ConditionNotMet,
    /// Soft fault to report with the node's result
    Warning { node: NodeId, code: ErrorCode },
    /// Fault that ends the dispatch
    Fault {
        node: NodeId,
        code: ErrorCode,
        severity: ErrorSeverity,
        action: FaultAction,
    },
}

/// Live state of the running group
#[derive(Debug)]
pub struct GroupExecutionState<'p> {
    plan: &'p GroupPlan,
    pending: MovePairs,
    /// Limit-switch pairs that finished without reaching the switch
    missed: MovePairs,
}

impl<'p> GroupExecutionState<'p> {
    /// Start tracking a group; every planned pair is pending
    pub fn new(plan: &'p GroupPlan) -> Self {
        Self {
            plan,
            pending: plan.moves.clone(),
            missed: MovePairs::new(),
        }
    }

    pub fn group_id(&self) -> u8 {
        self.plan.group_id
    }

    pub fn plan(&self) -> &'p GroupPlan {
        self.plan
    }

    /// Pairs not yet acknowledged
    pub fn pending(&self) -> &MovePairs {
        &self.pending
    }

    /// Returns true once nothing is outstanding
    pub fn is_resolved(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_limit_switch(&self) -> bool {
        self.plan.limit_switch
    }

    /// Pairs that have not met their stop condition: outstanding ones plus
    /// limit-switch moves that ran out of travel
    pub fn unmet(&self) -> MovePairs {
        let mut unmet = self.pending.clone();
        for pair in self.missed.iter() {
            // Both lists are drawn from the same plan, so they fit together
            let _ = unmet.push(*pair);
        }
        unmet
    }

    /// Feed one incoming message
    ///
    /// Completion reports for pairs of this group are folded into `acc`,
    /// including duplicates of pairs already acknowledged.
    pub fn observe(&mut self, incoming: &Incoming, acc: &mut Accumulator) -> Progress {
        let sender = incoming.sender;
        match incoming.response {
            Response::MoveCompleted { .. } | Response::TipActionResponse { .. } => {
                match CompletionRecord::from_response(sender, &incoming.response) {
                    Some(record) => self.on_completion(record, acc),
                    None => Progress::Ignored,
                }
            }
            Response::ErrorMessage { severity, code } => self.on_fault(sender, code, severity),
            _ => Progress::Ignored,
        }
    }

    fn on_completion(&mut self, record: CompletionRecord, acc: &mut Accumulator) -> Progress {
        let pair = (record.node, record.seq_id);
        if record.group_id != self.plan.group_id || !self.plan.moves.contains(&pair) {
            debug!(
                "unexpected completion {:?} group {} seq {}",
                record.node, record.group_id, record.seq_id
            );
            return Progress::Ignored;
        }

        let ack = record.ack;
        acc.observe(record);

        let Some(index) = self.pending.iter().position(|p| *p == pair) else {
            // Duplicate of a pair already acknowledged
            return if self.pending.is_empty() {
                Progress::Ignored
            } else {
                Progress::Pending
            };
        };
        self.pending.swap_remove(index);

        if self.plan.limit_switch {
            if ack == AckKind::StoppedByCondition {
                // The node is parked on its switch; its later moves never run
                let node = pair.0;
                self.pending.retain(|(n, _)| *n != node);
                debug!("{:?} reached its limit switch", node);
            } else {
                let _ = self.missed.push(pair);
            }
        }

        if !self.pending.is_empty() {
            Progress::Pending
        } else if !self.missed.is_empty() {
            Progress::ConditionNotMet
        } else {
            Progress::Complete
        }
    }

    fn on_fault(&self, node: NodeId, code: ErrorCode, severity: ErrorSeverity) -> Progress {
        let mut action = classify(code, severity);
        if action == FaultAction::AbortGroup && !self.plan.nodes.contains(&node) {
            // Not moving in this group, so it cannot spoil it
            action = FaultAction::AttachToNode;
        }
        if action.is_fatal() {
            Progress::Fault {
                node,
                code,
                severity,
                action,
            }
        } else {
            Progress::Warning { node, code }
        }
    }
}
