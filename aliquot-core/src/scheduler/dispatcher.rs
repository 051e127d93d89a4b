//! Move group dispatcher
//!
//! Runs an ordered list of [`MoveGroup`]s on the bus:
//!
//! 1. `prepare` encodes every step, clears whatever the nodes had staged,
//!    then stages every step on its node tagged with (group, sequence).
//! 2. `execute` triggers the groups one at a time with a broadcast and waits
//!    until every node of the running group has acknowledged its moves, a
//!    fault or timeout ends the wait, or the abort signal fires.
//!
//! Group N+1 is never triggered before group N has resolved.

use embassy_futures::select::{select3, Either3};
use embassy_time::{Instant, Timer};
use heapless::{LinearMap, Vec};

use aliquot_protocol::{CancelTrigger, ErrorCode, NodeId, Request, StartTrigger};

use super::accumulator::{Accumulator, CompletionRecord, MotorPositionStatus};
use super::error::DispatchError;
use super::pending::{GroupExecutionState, GroupPlan, Progress};
use crate::config::{ConfigError, DispatchConfig};
use crate::motion::{encode, MoveGroup, MAX_GROUPS, MAX_NODES};
use crate::safety::AbortSignal;
use crate::traits::{CanBus, Listener, Messenger, NamespaceClaim, TransportError};

/// Soft faults kept per dispatch
pub const MAX_DISPATCH_WARNINGS: usize = 16;

/// A soft fault reported during a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeWarning {
    pub node: NodeId,
    /// Group running when the fault arrived
    pub group: u8,
    pub code: ErrorCode,
}

/// Result of a successful dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Latest completion per node
    pub positions: LinearMap<NodeId, CompletionRecord, MAX_NODES>,
    /// Soft faults, in arrival order
    pub warnings: Vec<NodeWarning, MAX_DISPATCH_WARNINGS>,
}

impl DispatchOutcome {
    /// Final position of `node`
    pub fn status(&self, node: NodeId) -> Option<MotorPositionStatus> {
        self.positions.get(&node).map(CompletionRecord::status)
    }

    /// Returns true if no soft faults were reported
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Staged groups, ready to execute
///
/// Holds the bus namespace until it is executed or dropped.
pub struct PreparedHandle<'a> {
    groups: Vec<GroupPlan, MAX_GROUPS>,
    _claim: NamespaceClaim<'a>,
}

impl PreparedHandle<'_> {
    /// Plans of the staged groups, in execution order
    pub fn groups(&self) -> &[GroupPlan] {
        &self.groups
    }

    /// Total staged moves
    pub fn move_count(&self) -> usize {
        self.groups.iter().map(|g| g.moves.len()).sum()
    }
}

/// Runs move groups on one bus
pub struct MoveDispatcher<'a, B: CanBus> {
    messenger: Messenger<'a, B>,
    abort: &'a AbortSignal,
    config: DispatchConfig,
}

impl<'a, B: CanBus> MoveDispatcher<'a, B> {
    pub fn new(
        bus: &'a B,
        abort: &'a AbortSignal,
        config: DispatchConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            messenger: Messenger::new(bus),
            abort,
            config,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Prepare and execute in one call
    pub async fn run(&self, groups: &[MoveGroup]) -> Result<DispatchOutcome, DispatchError> {
        let handle = self.prepare(groups).await?;
        self.execute(handle).await
    }

    /// Stage every group on the nodes
    ///
    /// Waits for any other user of this bus to finish first. Nothing is sent
    /// unless every step encodes.
    pub async fn prepare(&self, groups: &[MoveGroup]) -> Result<PreparedHandle<'a>, DispatchError> {
        if groups.len() > MAX_GROUPS {
            return Err(DispatchError::CapacityExceeded);
        }
        for (group_id, group) in groups.iter().enumerate() {
            self.stage_group(group_id as u8, group, false).await?;
        }

        let claim = self.messenger.hub().claim().await;

        self.messenger
            .broadcast(&Request::ClearAllMoveGroups)
            .await
            .map_err(staging_error)?;

        let mut plans = Vec::new();
        for (group_id, group) in groups.iter().enumerate() {
            let group_id = group_id as u8;
            self.stage_group(group_id, group, true).await?;
            // Bounded by the check above
            let _ = plans.push(GroupPlan::new(group_id, group));
        }

        let handle = PreparedHandle {
            groups: plans,
            _claim: claim,
        };
        info!(
            "staged {} groups, {} moves",
            handle.groups.len(),
            handle.move_count()
        );
        Ok(handle)
    }

    /// Encode one group, sending each step when `transmit` is set
    async fn stage_group(
        &self,
        group_id: u8,
        group: &MoveGroup,
        transmit: bool,
    ) -> Result<(), DispatchError> {
        for (seq_id, step) in group.steps().iter().enumerate() {
            let seq_id = seq_id as u8;
            for (node, params) in step.iter() {
                let request = encode(params, group_id, seq_id, self.config.interrupts_per_sec)
                    .map_err(|error| DispatchError::Encoding {
                        group: group_id,
                        seq: seq_id,
                        node,
                        error,
                    })?;
                if transmit {
                    self.messenger
                        .send(node, &request)
                        .await
                        .map_err(staging_error)?;
                }
            }
        }
        Ok(())
    }

    /// Trigger the staged groups in order and collect the results
    pub async fn execute(&self, handle: PreparedHandle<'a>) -> Result<DispatchOutcome, DispatchError> {
        let mut listener = self
            .messenger
            .listen()
            .map_err(|_| DispatchError::ListenerUnavailable)?;
        let mut acc = Accumulator::new();
        let mut warnings = Vec::new();

        for plan in handle.groups.iter() {
            let mut state = GroupExecutionState::new(plan);
            if self.abort.is_fired() {
                let err = DispatchError::Cancelled {
                    group: plan.group_id,
                    pending: state.pending().clone(),
                };
                return Err(self.halt(err).await);
            }
            if state.is_resolved() {
                debug!("group {} has no moves", plan.group_id);
                continue;
            }
            self.run_group(&mut state, &mut listener, &mut acc, &mut warnings)
                .await?;
        }

        let mut positions = acc.finish();
        for warning in warnings.iter() {
            if let Some(record) = positions.get_mut(&warning.node) {
                record.attach_warning(warning.code);
            }
        }
        Ok(DispatchOutcome {
            positions,
            warnings,
        })
    }

    async fn run_group(
        &self,
        state: &mut GroupExecutionState<'_>,
        listener: &mut Listener<'_>,
        acc: &mut Accumulator,
        warnings: &mut Vec<NodeWarning, MAX_DISPATCH_WARNINGS>,
    ) -> Result<(), DispatchError> {
        let group = state.group_id();
        let timeout = self.config.group_timeout(state.plan().duration_s);

        self.messenger
            .broadcast(&Request::ExecuteMoveGroup {
                group_id: group,
                start_trigger: StartTrigger::Immediate,
                cancel_trigger: CancelTrigger::None,
            })
            .await
            .map_err(|error| DispatchError::Transport {
                group: Some(group),
                error,
            })?;
        let deadline = Instant::now() + timeout;
        debug!(
            "group {} triggered, {} moves, timeout {} ms",
            group,
            state.pending().len(),
            timeout.as_millis()
        );

        loop {
            match select3(listener.next(), Timer::at(deadline), self.abort.wait()).await {
                Either3::First(incoming) => match state.observe(&incoming, acc) {
                    Progress::Ignored | Progress::Pending => {}
                    Progress::Complete => {
                        debug!("group {} complete", group);
                        return Ok(());
                    }
                    Progress::ConditionNotMet => {
                        warn!("group {} finished off its limit switches", group);
                        return Err(DispatchError::ConditionNotMet {
                            group,
                            pending: state.unmet(),
                        });
                    }
                    Progress::Warning { node, code } => {
                        warn!("{:?} reported {:?} in group {}", node, code, group);
                        if warnings.push(NodeWarning { node, group, code }).is_err() {
                            warn!("warning list full, dropping {:?}", code);
                        }
                    }
                    Progress::Fault {
                        node,
                        code,
                        severity,
                        action,
                    } => {
                        error!(
                            "{:?} reported {:?} ({:?}), {:?}",
                            node, code, severity, action
                        );
                        let pending = state.pending().clone();
                        let err = if code == ErrorCode::EstopDetected {
                            DispatchError::EstopActivated {
                                group,
                                node,
                                pending,
                            }
                        } else {
                            DispatchError::HardwareFault {
                                group,
                                node,
                                code,
                                severity,
                                pending,
                            }
                        };
                        return Err(self.halt(err).await);
                    }
                },
                Either3::Second(()) => {
                    if state.is_limit_switch() {
                        warn!("group {} timed out before its limit switches", group);
                        return Err(DispatchError::ConditionNotMet {
                            group,
                            pending: state.unmet(),
                        });
                    }
                    error!(
                        "group {} timed out, {} moves outstanding",
                        group,
                        state.pending().len()
                    );
                    let err = DispatchError::Timeout {
                        group,
                        pending: state.pending().clone(),
                    };
                    return Err(self.halt(err).await);
                }
                Either3::Third(()) => {
                    warn!("group {} cancelled", group);
                    let err = DispatchError::Cancelled {
                        group,
                        pending: state.pending().clone(),
                    };
                    return Err(self.halt(err).await);
                }
            }
        }
    }

    /// Stop every node, then hand back the error that caused it
    async fn halt(&self, cause: DispatchError) -> DispatchError {
        if let Err(e) = self.messenger.broadcast(&Request::StopRequest).await {
            error!("stop request failed: {:?}", e);
        }
        cause
    }
}

fn staging_error(error: TransportError) -> DispatchError {
    DispatchError::Transport { group: None, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{MoveGroupStep, StepParameters, MAX_STEPS_PER_GROUP};
    use crate::sim::{run_with, NodeBehaviour, SimBus, SimEvent};
    use aliquot_protocol::{AckKind, ErrorSeverity, StopCondition};
    use embassy_futures::join::join;
    use embassy_time::Duration;

    fn step(moves: &[(NodeId, StepParameters)]) -> MoveGroupStep {
        let mut step = MoveGroupStep::new();
        for (node, params) in moves {
            step.insert(*node, *params).unwrap();
        }
        step
    }

    fn group(steps: &[MoveGroupStep]) -> MoveGroup {
        let mut group = MoveGroup::new();
        for s in steps {
            group.push(s.clone()).unwrap();
        }
        group
    }

    fn homing(nodes: &[NodeId], duration_s: f64) -> MoveGroup {
        let moves: std::vec::Vec<_> = nodes
            .iter()
            .map(|n| (*n, StepParameters::home(duration_s, -20.0)))
            .collect();
        group(&[step(&moves)])
    }

    fn dispatcher<'a>(bus: &'a SimBus, abort: &'a AbortSignal) -> MoveDispatcher<'a, SimBus> {
        MoveDispatcher::new(bus, abort, DispatchConfig::default()).unwrap()
    }

    #[test]
    fn test_two_node_scenario() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [group(&[step(&[
            (NodeId::GantryX, StepParameters::linear(1.0, 10.0)),
            (NodeId::GantryY, StepParameters::linear(1.0, 10.0)),
        ])])];

        let start = Instant::now();
        let outcome = run_with(&bus, dispatcher.run(&groups)).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome.positions.len(), 2);
        assert_eq!(outcome.status(NodeId::GantryX).unwrap().position_mm, 10.0);
        assert_eq!(outcome.status(NodeId::GantryY).unwrap().position_mm, 10.0);
        assert!(outcome.is_clean());
        assert!(elapsed <= Duration::from_millis(1100 + 150));
    }

    #[test]
    fn test_staging_order() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[
                step(&[(NodeId::HeadL, StepParameters::linear(0.02, 5.0))]),
                step(&[(NodeId::HeadL, StepParameters::linear(0.02, -5.0))]),
            ]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.02, 5.0))])]),
        ];

        let handle = run_with(&bus, dispatcher.prepare(&groups)).unwrap();
        assert_eq!(handle.move_count(), 3);
        assert!(bus.hub().is_claimed());

        let sent = bus.sent();
        assert_eq!(sent[0], (NodeId::Broadcast, Request::ClearAllMoveGroups));
        let tags: std::vec::Vec<_> = sent[1..]
            .iter()
            .map(|(node, req)| (*node, req.move_tag().unwrap()))
            .collect();
        assert_eq!(
            tags,
            [
                (NodeId::HeadL, (0, 0)),
                (NodeId::HeadL, (0, 1)),
                (NodeId::GantryX, (1, 0)),
            ]
        );
        // Nothing triggered yet
        assert!(bus.triggers().is_empty());

        drop(handle);
        assert!(!bus.hub().is_claimed());
    }

    #[test]
    fn test_furthest_sequence_wins() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[
                step(&[(NodeId::HeadL, StepParameters::linear(0.05, 20.0))]),
                step(&[(NodeId::HeadL, StepParameters::linear(0.05, -10.0))]),
            ]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.05, 40.0))])]),
        ];

        let outcome = run_with(&bus, dispatcher.run(&groups)).unwrap();
        let head = &outcome.positions[&NodeId::HeadL];
        assert_eq!(head.tag(), (0, 1));
        assert_eq!(head.position_mm(), 0.5);
        assert_eq!(outcome.positions[&NodeId::GantryX].position_mm(), 2.0);
    }

    #[test]
    fn test_groups_run_sequentially() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[step(&[
                (NodeId::GantryX, StepParameters::linear(0.05, 1.0)),
                (NodeId::GantryY, StepParameters::linear(0.08, 1.0)),
            ])]),
            group(&[step(&[(NodeId::HeadL, StepParameters::linear(0.03, 1.0))])]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.03, 1.0))])]),
        ];

        run_with(&bus, dispatcher.run(&groups)).unwrap();

        let events = bus.events();
        let trigger_at = |g: u8| {
            events
                .iter()
                .position(|e| matches!(e, SimEvent::Sent { request: Request::ExecuteMoveGroup { group_id, .. }, .. } if *group_id == g))
                .unwrap()
        };
        let last_reply = |g: u8| {
            events
                .iter()
                .rposition(|e| matches!(e, SimEvent::Replied { group: Some(rg), .. } if *rg == g))
                .unwrap()
        };
        assert!(last_reply(0) < trigger_at(1));
        assert!(last_reply(1) < trigger_at(2));
    }

    #[test]
    fn test_full_group_acks_in_one_burst() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        // Zero-length moves all report at the trigger instant
        let moves: std::vec::Vec<_> = NodeId::MOTION_NODES
            .iter()
            .map(|n| (*n, StepParameters::linear(0.0, 0.0)))
            .collect();
        let steps: std::vec::Vec<_> = (0..MAX_STEPS_PER_GROUP).map(|_| step(&moves)).collect();
        let groups = [group(&steps)];

        let outcome = run_with(&bus, dispatcher.run(&groups)).unwrap();
        assert_eq!(outcome.positions.len(), MAX_NODES);
        for record in outcome.positions.values() {
            assert_eq!(record.seq_id as usize, MAX_STEPS_PER_GROUP - 1);
        }
        assert_eq!(bus.stops(), 0);
    }

    #[test]
    fn test_duplicate_acks() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::GantryX, NodeBehaviour::Duplicate);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[step(&[
                (NodeId::GantryX, StepParameters::linear(0.05, 10.0)),
                (NodeId::GantryY, StepParameters::linear(0.05, 10.0)),
            ])]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.05, 10.0))])]),
        ];

        let outcome = run_with(&bus, dispatcher.run(&groups)).unwrap();
        assert_eq!(outcome.positions[&NodeId::GantryX].tag(), (1, 0));
        assert_eq!(outcome.positions[&NodeId::GantryX].position_mm(), 1.0);
    }

    #[test]
    fn test_timeout_window() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::GantryY, NodeBehaviour::Silent);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[step(&[
                (NodeId::GantryX, StepParameters::linear(0.2, 1.0)),
                (NodeId::GantryY, StepParameters::linear(0.2, 1.0)),
            ])]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.1, 1.0))])]),
        ];

        let start = Instant::now();
        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        let elapsed = start.elapsed();

        match &err {
            DispatchError::Timeout { group, pending } => {
                assert_eq!(*group, 0);
                assert_eq!(pending.as_slice(), &[(NodeId::GantryY, 0)]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        // 0.2 s * 1.1
        assert!(elapsed >= Duration::from_micros(217_800));
        assert!(elapsed <= Duration::from_micros(330_000));

        // Fatal: every node told to stop, later groups never triggered
        assert_eq!(bus.triggers(), [0]);
        assert_eq!(bus.stops(), 1);
    }

    #[test]
    fn test_limit_switch_group_waits_for_every_node() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::HeadL, NodeBehaviour::LimitSwitch);
        bus.set_behaviour(NodeId::HeadR, NodeBehaviour::Silent);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            homing(&[NodeId::HeadL, NodeId::HeadR], 0.1),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.02, 1.0))])]),
        ];

        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        match err {
            DispatchError::ConditionNotMet { group, pending } => {
                assert_eq!(group, 0);
                assert_eq!(pending.as_slice(), &[(NodeId::HeadR, 0)]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        // HeadR may still be moving, so the next group must not start
        assert_eq!(bus.triggers(), [0]);
    }

    #[test]
    fn test_limit_switch_group_completes() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::HeadL, NodeBehaviour::LimitSwitch);
        bus.set_behaviour(NodeId::HeadR, NodeBehaviour::LimitSwitch);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);

        let outcome =
            run_with(&bus, dispatcher.run(&[homing(&[NodeId::HeadL, NodeId::HeadR], 0.4)])).unwrap();
        assert_eq!(outcome.positions.len(), 2);
        for node in [NodeId::HeadL, NodeId::HeadR] {
            let head = &outcome.positions[&node];
            assert_eq!(head.ack, AckKind::StoppedByCondition);
            assert_eq!(head.position_um, 0);
        }
    }

    #[test]
    fn test_limit_switch_not_met_then_retry() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::HeadL, NodeBehaviour::Silent);
        bus.set_behaviour(NodeId::HeadR, NodeBehaviour::Silent);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [homing(&[NodeId::HeadL, NodeId::HeadR], 0.1)];

        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.pending().len(), 2);
        // Recoverable: no stop broadcast
        assert_eq!(bus.stops(), 0);

        // The bus is free for the retry
        bus.set_behaviour(NodeId::HeadL, NodeBehaviour::LimitSwitch);
        bus.set_behaviour(NodeId::HeadR, NodeBehaviour::LimitSwitch);
        let outcome = run_with(&bus, dispatcher.run(&groups)).unwrap();
        assert_eq!(outcome.positions.len(), 2);
        assert_eq!(bus.triggers(), [0, 0]);
    }

    #[test]
    fn test_limit_switch_missed_ack() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::HeadL, NodeBehaviour::MissSwitch);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);

        let err = run_with(&bus, dispatcher.run(&[homing(&[NodeId::HeadL], 0.05)])).unwrap_err();
        match err {
            DispatchError::ConditionNotMet { group, pending } => {
                assert_eq!(group, 0);
                assert_eq!(pending.as_slice(), &[(NodeId::HeadL, 0)]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_estop_aborts_everything() {
        let bus = SimBus::new();
        bus.set_behaviour(
            NodeId::GantryY,
            NodeBehaviour::Fault(ErrorSeverity::Unrecoverable, ErrorCode::EstopDetected),
        );
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[step(&[
                (NodeId::GantryX, StepParameters::linear(0.5, 1.0)),
                (NodeId::GantryY, StepParameters::linear(0.5, 1.0)),
            ])]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.1, 1.0))])]),
        ];

        let start = Instant::now();
        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(400));
        match err {
            DispatchError::EstopActivated { group, node, .. } => {
                assert_eq!(group, 0);
                assert_eq!(node, NodeId::GantryY);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(bus.stops(), 1);
        assert_eq!(bus.triggers(), [0]);
    }

    #[test]
    fn test_collision_aborts_group() {
        let bus = SimBus::new();
        bus.set_behaviour(
            NodeId::GantryX,
            NodeBehaviour::Fault(ErrorSeverity::Recoverable, ErrorCode::CollisionDetected),
        );
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [group(&[step(&[(
            NodeId::GantryX,
            StepParameters::linear(0.3, 1.0),
        )])])];

        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::HardwareFault {
                code: ErrorCode::CollisionDetected,
                severity: ErrorSeverity::Recoverable,
                ..
            }
        ));
        assert_eq!(bus.stops(), 1);
    }

    #[test]
    fn test_soft_fault_attached() {
        let bus = SimBus::new();
        bus.set_behaviour(NodeId::GantryX, NodeBehaviour::Warn(ErrorCode::MotorBusy));
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [group(&[step(&[
            (NodeId::GantryX, StepParameters::linear(0.05, 10.0)),
            (NodeId::GantryY, StepParameters::linear(0.05, 10.0)),
        ])])];

        let outcome = run_with(&bus, dispatcher.run(&groups)).unwrap();
        assert_eq!(
            outcome.warnings.as_slice(),
            &[NodeWarning {
                node: NodeId::GantryX,
                group: 0,
                code: ErrorCode::MotorBusy
            }]
        );
        assert_eq!(
            outcome.positions[&NodeId::GantryX].warnings.as_slice(),
            &[ErrorCode::MotorBusy]
        );
        assert!(outcome.positions[&NodeId::GantryY].warnings.is_empty());
        assert_eq!(bus.stops(), 0);
    }

    #[test]
    fn test_cancel_mid_group() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(1.0, 1.0))])]),
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(1.0, 1.0))])]),
        ];

        let start = Instant::now();
        let (result, ()) = run_with(
            &bus,
            join(dispatcher.run(&groups), async {
                Timer::after(Duration::from_millis(50)).await;
                abort.fire();
            }),
        );
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(matches!(result, Err(DispatchError::Cancelled { group: 0, .. })));
        assert_eq!(bus.triggers(), [0]);
        assert_eq!(bus.stops(), 1);
    }

    #[test]
    fn test_fired_abort_refuses_dispatch() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        abort.fire();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [group(&[step(&[(
            NodeId::GantryX,
            StepParameters::linear(0.05, 1.0),
        )])])];

        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { group: 0, .. }));
        assert!(bus.triggers().is_empty());

        abort.reset();
        assert!(run_with(&bus, dispatcher.run(&groups)).is_ok());
    }

    #[test]
    fn test_encoding_error_sends_nothing() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [
            group(&[step(&[(NodeId::GantryX, StepParameters::linear(0.05, 1.0))])]),
            group(&[step(&[(NodeId::GantryY, StepParameters::linear(-1.0, 1.0))])]),
        ];

        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Encoding {
                group: 1,
                seq: 0,
                node: NodeId::GantryY,
                ..
            }
        ));
        assert!(bus.sent().is_empty());
    }

    #[test]
    fn test_transport_error_while_staging() {
        let bus = SimBus::new();
        bus.fail_writes(TransportError::BusOff);
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [group(&[step(&[(
            NodeId::GantryX,
            StepParameters::linear(0.05, 1.0),
        )])])];

        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Transport {
                group: None,
                error: TransportError::BusOff
            }
        );
        assert!(!bus.hub().is_claimed());
    }

    #[test]
    fn test_capacity() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups: std::vec::Vec<MoveGroup> = (0..=MAX_GROUPS).map(|_| MoveGroup::new()).collect();
        let err = run_with(&bus, dispatcher.run(&groups)).unwrap_err();
        assert_eq!(err, DispatchError::CapacityExceeded);
    }

    #[test]
    fn test_empty_group_resolves_immediately() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let outcome = run_with(&bus, dispatcher.run(&[MoveGroup::new()])).unwrap();
        assert!(outcome.positions.is_empty());
        assert!(bus.triggers().is_empty());
    }

    #[test]
    fn test_concurrent_dispatches_serialize() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let first = dispatcher(&bus, &abort);
        let second = dispatcher(&bus, &abort);
        let a = [group(&[step(&[(
            NodeId::GantryX,
            StepParameters::linear(0.1, 1.0),
        )])])];
        let b = [group(&[step(&[(
            NodeId::GantryY,
            StepParameters::linear(0.1, 1.0),
        )])])];

        let (ra, rb) = run_with(&bus, join(first.run(&a), second.run(&b)));
        assert!(ra.unwrap().positions.contains_key(&NodeId::GantryX));
        assert!(rb.unwrap().positions.contains_key(&NodeId::GantryY));

        // The second clear only goes out once the first dispatch has its answer
        let events = bus.events();
        let clears: std::vec::Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, SimEvent::Sent { request: Request::ClearAllMoveGroups, .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(clears.len(), 2);
        let first_reply = events
            .iter()
            .position(|e| matches!(e, SimEvent::Replied { .. }))
            .unwrap();
        assert!(first_reply < clears[1]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let config = DispatchConfig {
            timeout_margin: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            MoveDispatcher::new(&bus, &abort, config),
            Err(ConfigError::InvalidTimeoutMargin)
        ));
    }

    #[test]
    fn test_stop_condition_reaches_node() {
        let bus = SimBus::new();
        let abort = AbortSignal::new();
        let dispatcher = dispatcher(&bus, &abort);
        let groups = [group(&[step(&[(
            NodeId::GantryX,
            StepParameters::linear_with(0.05, 1.0, 0.0, StopCondition::Stall),
        )])])];
        run_with(&bus, dispatcher.run(&groups)).unwrap();
        assert!(bus.sent().iter().any(|(_, r)| matches!(
            r,
            Request::AddLinearMove {
                stop_condition: StopCondition::Stall,
                ..
            }
        )));
    }
}
