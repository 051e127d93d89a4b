//! Completion accumulator
//!
//! Nodes report every finished move. The host only cares about the last
//! thing each node did, so reports are folded into one record per node,
//! keeping the one with the greatest (group, sequence) tag. Reports may
//! arrive in any order and more than once; the fold gives the same answer
//! regardless.

use core::cmp::Ordering;

use heapless::{LinearMap, Vec};

use aliquot_protocol::fixed_point::um_to_mm;
use aliquot_protocol::{AckKind, ErrorCode, NodeId, PositionFlags, Response};

use crate::motion::MAX_NODES;

/// Soft faults kept per node
pub const MAX_WARNINGS: usize = 4;

/// Final position of one node
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorPositionStatus {
    pub position_mm: f64,
    /// Encoder reading, when the encoder reported a valid one
    pub encoder_position_mm: Option<f64>,
    pub motor_ok: bool,
    pub encoder_ok: bool,
}

/// One node's report of a finished move
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionRecord {
    pub node: NodeId,
    pub group_id: u8,
    pub seq_id: u8,
    /// Commanded position (µm)
    pub position_um: i32,
    /// Encoder position (µm)
    pub encoder_position_um: i32,
    pub flags: PositionFlags,
    pub ack: AckKind,
    /// Tip actions report whether the tip was actually handled
    pub tip_success: Option<bool>,
    /// Soft faults the node raised during the dispatch
    pub warnings: Vec<ErrorCode, MAX_WARNINGS>,
}

impl CompletionRecord {
    /// Build a record from a completion message
    ///
    /// Returns `None` for responses that do not report a finished move.
    pub fn from_response(sender: NodeId, response: &Response) -> Option<Self> {
        match *response {
            Response::MoveCompleted {
                group_id,
                seq_id,
                current_position_um,
                encoder_position_um,
                position_flags,
                ack,
            } => Some(Self {
                node: sender,
                group_id,
                seq_id,
                position_um: current_position_um,
                encoder_position_um,
                flags: position_flags,
                ack,
                tip_success: None,
                warnings: Vec::new(),
            }),
            Response::TipActionResponse {
                group_id,
                seq_id,
                current_position_um,
                encoder_position_um,
                position_flags,
                ack,
                success,
                ..
            } => Some(Self {
                node: sender,
                group_id,
                seq_id,
                position_um: current_position_um,
                encoder_position_um,
                flags: position_flags,
                ack,
                tip_success: Some(success),
                warnings: Vec::new(),
            }),
            _ => None,
        }
    }

    /// (group, sequence) tag of the move this record reports
    pub fn tag(&self) -> (u8, u8) {
        (self.group_id, self.seq_id)
    }

    pub fn position_mm(&self) -> f64 {
        um_to_mm(self.position_um)
    }

    /// Position summary
    pub fn status(&self) -> MotorPositionStatus {
        let encoder_ok = self.flags.encoder_ok();
        MotorPositionStatus {
            position_mm: self.position_mm(),
            encoder_position_mm: encoder_ok.then(|| um_to_mm(self.encoder_position_um)),
            motor_ok: self.flags.motor_ok(),
            encoder_ok,
        }
    }

    /// Attach a soft fault; oldest are kept when the list is full
    pub fn attach_warning(&mut self, code: ErrorCode) {
        if !self.warnings.contains(&code) {
            let _ = self.warnings.push(code);
        }
    }

    /// Total order used to pick between two reports
    ///
    /// The tag decides. Distinct reports with the same tag are ordered by
    /// their content so the winner never depends on arrival order.
    fn precedence(&self, other: &Self) -> Ordering {
        self.tag()
            .cmp(&other.tag())
            .then(self.ack.to_byte().cmp(&other.ack.to_byte()))
            .then(self.position_um.cmp(&other.position_um))
            .then(self.encoder_position_um.cmp(&other.encoder_position_um))
            .then(self.flags.0.cmp(&other.flags.0))
            .then(self.tip_success.cmp(&other.tip_success))
    }
}

/// Running fold of completion records
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    latest: LinearMap<NodeId, CompletionRecord, MAX_NODES>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            latest: LinearMap::new(),
        }
    }

    /// Fold one record in
    pub fn observe(&mut self, record: CompletionRecord) {
        if let Some(current) = self.latest.get_mut(&record.node) {
            if record.precedence(current) == Ordering::Greater {
                *current = record;
            }
            return;
        }
        if self.latest.insert(record.node, record).is_err() {
            // Only motion nodes report moves and there are MAX_NODES of them
            warn!("completion map full");
        }
    }

    /// Latest record for `node`
    pub fn get(&self, node: NodeId) -> Option<&CompletionRecord> {
        self.latest.get(&node)
    }

    /// Mutable access, used to attach warnings
    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut CompletionRecord> {
        self.latest.get_mut(&node)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// The reduced map
    pub fn finish(self) -> LinearMap<NodeId, CompletionRecord, MAX_NODES> {
        self.latest
    }
}

/// Reduce records to the latest one per node
pub fn reduce<'r>(
    records: impl IntoIterator<Item = &'r CompletionRecord>,
) -> LinearMap<NodeId, CompletionRecord, MAX_NODES> {
    let mut acc = Accumulator::new();
    for record in records {
        acc.observe(record.clone());
    }
    acc.finish()
}
