//! Move groups
//!
//! A [`MoveGroup`] is an ordered list of [`MoveGroupStep`]s. Each step maps
//! nodes to the move they perform simultaneously; the group as a whole is
//! released with one broadcast and completes when every node has finished
//! every step it was given.

use heapless::{LinearMap, Vec};

use aliquot_protocol::NodeId;

use super::step::StepParameters;

/// Maximum nodes in one step (every motion node on the bus)
pub const MAX_NODES: usize = 10;

/// Maximum steps per group
pub const MAX_STEPS_PER_GROUP: usize = 8;

/// Maximum groups per dispatch
pub const MAX_GROUPS: usize = 8;

/// Maximum (node, sequence) pairs in one group
pub const MAX_MOVES_PER_GROUP: usize = MAX_NODES * MAX_STEPS_PER_GROUP;

/// Errors building a move group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GroupError {
    /// Step already holds `MAX_NODES` nodes
    TooManyNodes,
    /// Group already holds `MAX_STEPS_PER_GROUP` steps
    TooManySteps,
    /// Broadcast and host addresses cannot execute moves
    ReservedNode(NodeId),
}

/// Simultaneous moves for one barrier point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveGroupStep {
    moves: LinearMap<NodeId, StepParameters, MAX_NODES>,
}

impl MoveGroupStep {
    /// Create an empty step
    pub fn new() -> Self {
        Self {
            moves: LinearMap::new(),
        }
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, node: NodeId, params: StepParameters) -> Result<Self, GroupError> {
        self.insert(node, params)?;
        Ok(self)
    }

    /// Set the move for `node`, replacing any previous one
    pub fn insert(
        &mut self,
        node: NodeId,
        params: StepParameters,
    ) -> Result<Option<StepParameters>, GroupError> {
        if node.is_reserved() {
            return Err(GroupError::ReservedNode(node));
        }
        self.moves
            .insert(node, params)
            .map_err(|_| GroupError::TooManyNodes)
    }

    /// Move assigned to `node`, if any
    pub fn get(&self, node: NodeId) -> Option<&StepParameters> {
        self.moves.get(&node)
    }

    /// Iterate over node moves
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &StepParameters)> {
        self.moves.iter().map(|(node, params)| (*node, params))
    }

    /// Number of nodes moving in this step
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Returns true if no node moves in this step
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Wall-clock length of the step (its longest move)
    pub fn duration_s(&self) -> f64 {
        self.moves
            .values()
            .map(StepParameters::duration_s)
            .fold(0.0, f64::max)
    }

    /// Returns true if every move in the step ends on a limit switch
    pub fn stops_on_limit_switch(&self) -> bool {
        !self.moves.is_empty()
            && self
                .moves
                .values()
                .all(|params| params.stop_condition().is_limit_switch())
    }
}

/// Ordered steps executed as one barrier-synchronized batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveGroup {
    steps: Vec<MoveGroupStep, MAX_STEPS_PER_GROUP>,
}

impl MoveGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Group holding a single step
    pub fn single(step: MoveGroupStep) -> Self {
        let mut steps = Vec::new();
        // Capacity is at least one
        let _ = steps.push(step);
        Self { steps }
    }

    /// Append a step
    pub fn push(&mut self, step: MoveGroupStep) -> Result<(), GroupError> {
        self.steps.push(step).map_err(|_| GroupError::TooManySteps)
    }

    /// Builder form of [`push`](Self::push)
    pub fn then(mut self, step: MoveGroupStep) -> Result<Self, GroupError> {
        self.push(step)?;
        Ok(self)
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[MoveGroupStep] {
        &self.steps
    }

    /// Total number of (node, sequence) moves
    pub fn move_count(&self) -> usize {
        self.steps.iter().map(MoveGroupStep::len).sum()
    }

    /// Expected group length: steps run back to back
    pub fn duration_s(&self) -> f64 {
        self.steps.iter().map(MoveGroupStep::duration_s).sum()
    }

    /// Returns true if every step of the group ends on a limit switch
    pub fn stops_on_limit_switch(&self) -> bool {
        let mut moving = self.steps.iter().filter(|step| !step.is_empty()).peekable();
        moving.peek().is_some() && moving.all(MoveGroupStep::stops_on_limit_switch)
    }

    /// Distinct nodes taking part in the group
    pub fn nodes(&self) -> Vec<NodeId, MAX_NODES> {
        let mut nodes: Vec<NodeId, MAX_NODES> = Vec::new();
        for (node, _) in self.steps.iter().flat_map(MoveGroupStep::iter) {
            if !nodes.contains(&node) {
                // Every node is a motion node, so MAX_NODES always suffices
                let _ = nodes.push(node);
            }
        }
        nodes
    }
}
