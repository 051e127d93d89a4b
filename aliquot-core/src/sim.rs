//! Simulated bus for host tests
//!
//! Nodes answer staged moves on real time: a move that lasts 50 ms reports
//! 50 ms after its group is triggered. Every frame the host writes is decoded
//! and logged, every reply is logged when it reaches the hub.

use core::cell::RefCell;
use core::convert::Infallible;
use core::future::Future;
use std::collections::HashMap;
use std::vec::Vec;

use embassy_futures::block_on;
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};

use aliquot_protocol::fixed_point::{mm_to_um, sensor_to_fixed, DEFAULT_INTERRUPTS_PER_SEC};
use aliquot_protocol::{
    AckKind, CanFrame, ErrorCode, ErrorSeverity, NodeId, PositionFlags, Request, Response,
    SensorId, SensorOutputBinding, SensorType,
};

use crate::motion::{decode, StepParameters};
use crate::traits::{CanBus, MessageHub, TransportError};

/// How a simulated node reacts to its staged moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeBehaviour {
    /// Run every move to the end
    #[default]
    Complete,
    /// Hit the switch halfway and report position zero
    LimitSwitch,
    /// Run to the end without meeting the stop condition
    MissSwitch,
    /// Never answer
    Silent,
    /// Report a fault shortly after the trigger and stop answering
    Fault(ErrorSeverity, ErrorCode),
    /// Report a warning, then complete normally
    Warn(ErrorCode),
    /// Send every completion twice
    Duplicate,
}

/// Bus traffic in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Sent {
        to: NodeId,
        request: Request,
    },
    Replied {
        from: NodeId,
        response: Response,
        group: Option<u8>,
    },
}

struct Scheduled {
    at: Instant,
    from: NodeId,
    response: Response,
}

#[derive(Default)]
struct SimState {
    behaviours: HashMap<NodeId, NodeBehaviour>,
    staged: Vec<(NodeId, Request)>,
    positions_um: HashMap<NodeId, i32>,
    sensors: HashMap<(NodeId, SensorType), i32>,
    bindings: HashMap<(NodeId, SensorType), SensorOutputBinding>,
    outbox: Vec<Scheduled>,
    events: Vec<SimEvent>,
    fail_writes: Option<TransportError>,
}

impl SimState {
    fn behaviour(&self, node: NodeId) -> NodeBehaviour {
        self.behaviours.get(&node).copied().unwrap_or_default()
    }

    fn reply(&mut self, at: Instant, from: NodeId, response: Response) {
        self.outbox.push(Scheduled { at, from, response });
    }

    fn handle(&mut self, to: NodeId, request: Request, now: Instant) {
        match request {
            Request::ClearAllMoveGroups => {
                self.staged.retain(|(node, _)| to != NodeId::Broadcast && *node != to);
            }
            Request::AddLinearMove { .. }
            | Request::HomeRequest { .. }
            | Request::GripperMove { .. }
            | Request::TipAction { .. } => self.staged.push((to, request)),
            Request::ExecuteMoveGroup { group_id, .. } => self.trigger(group_id, now),
            Request::StopRequest => self.outbox.clear(),
            Request::ReadSensor {
                sensor, sensor_id, ..
            } => {
                if let Some(value) = self.sensors.get(&(to, sensor)).copied() {
                    let sensor_id = if sensor_id == SensorId::Both {
                        SensorId::S0
                    } else {
                        sensor_id
                    };
                    self.reply(
                        now + Duration::from_millis(1),
                        to,
                        Response::ReadSensorResponse {
                            sensor,
                            sensor_id,
                            value,
                        },
                    );
                }
            }
            Request::WriteSensor { sensor, data, .. } => {
                self.sensors.insert((to, sensor), data as i32);
            }
            Request::BaselineSensor { .. } => {}
            Request::SetSensorThreshold {
                sensor,
                sensor_id,
                threshold,
                mode,
            } => self.reply(
                now + Duration::from_millis(1),
                to,
                Response::SensorThresholdResponse {
                    sensor,
                    sensor_id,
                    threshold,
                    mode,
                },
            ),
            Request::BindSensorOutput {
                sensor, binding, ..
            } => {
                self.bindings.insert((to, sensor), binding);
            }
        }
    }

    fn trigger(&mut self, group_id: u8, now: Instant) {
        let mut moves: Vec<(NodeId, Request)> = self
            .staged
            .iter()
            .filter(|(_, r)| matches!(r.move_tag(), Some((g, _)) if g == group_id))
            .copied()
            .collect();
        moves.sort_by_key(|(node, r)| (*node, r.move_tag()));

        let mut elapsed: HashMap<NodeId, Duration> = HashMap::new();
        let mut reported: Vec<NodeId> = Vec::new();
        for (node, request) in moves {
            let behaviour = self.behaviour(node);
            if !reported.contains(&node) {
                reported.push(node);
                match behaviour {
                    NodeBehaviour::Fault(severity, code) => self.reply(
                        now + Duration::from_millis(5),
                        node,
                        Response::ErrorMessage { severity, code },
                    ),
                    NodeBehaviour::Warn(code) => self.reply(
                        now + Duration::from_millis(1),
                        node,
                        Response::ErrorMessage {
                            severity: ErrorSeverity::Warning,
                            code,
                        },
                    ),
                    _ => {}
                }
            }
            if matches!(behaviour, NodeBehaviour::Silent | NodeBehaviour::Fault(..)) {
                continue;
            }
            let Some(params) = decode(&request, DEFAULT_INTERRUPTS_PER_SEC) else {
                continue;
            };
            let Some((_, seq_id)) = request.move_tag() else {
                continue;
            };

            let offset = elapsed.entry(node).or_insert(Duration::from_ticks(0));
            let run = Duration::from_micros((params.duration_s() * 1e6) as u64);
            let position = self.positions_um.entry(node).or_insert(0);
            let (took, ack) = match behaviour {
                NodeBehaviour::LimitSwitch => {
                    *position = 0;
                    (run / 2, AckKind::StoppedByCondition)
                }
                NodeBehaviour::MissSwitch => {
                    *position += displacement_um(&params);
                    (run, AckKind::Timeout)
                }
                _ => {
                    *position += displacement_um(&params);
                    (run, AckKind::CompleteWithoutCondition)
                }
            };
            *offset += took;
            let at = now + *offset;
            let current_position_um = *position;

            let response = match request {
                Request::TipAction { action, .. } => Response::TipActionResponse {
                    group_id,
                    seq_id,
                    current_position_um,
                    encoder_position_um: current_position_um,
                    position_flags: PositionFlags::all_ok(),
                    ack,
                    action,
                    success: true,
                },
                _ => Response::MoveCompleted {
                    group_id,
                    seq_id,
                    current_position_um,
                    encoder_position_um: current_position_um,
                    position_flags: PositionFlags::all_ok(),
                    ack,
                },
            };
            self.reply(at, node, response);
            if behaviour == NodeBehaviour::Duplicate {
                self.reply(at, node, response);
            }
        }
    }
}

fn displacement_um(params: &StepParameters) -> i32 {
    let mm = match params {
        StepParameters::LinearMove(m) => {
            m.velocity_mm_s * m.duration_s + 0.5 * m.acceleration_mm_s2 * m.duration_s * m.duration_s
        }
        StepParameters::HomeMove(m) => m.velocity_mm_s * m.duration_s,
        StepParameters::GripperMove(m) => return mm_to_um(m.encoder_position_mm).unwrap_or(0),
        StepParameters::TipActionMove(m) => m.velocity_mm_s * m.duration_s,
    };
    mm_to_um(mm).unwrap_or(0)
}

/// In-process bus with scripted nodes
pub struct SimBus {
    hub: MessageHub,
    state: RefCell<SimState>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            hub: MessageHub::new(),
            state: RefCell::new(SimState::default()),
        }
    }

    pub fn set_behaviour(&self, node: NodeId, behaviour: NodeBehaviour) {
        self.state.borrow_mut().behaviours.insert(node, behaviour);
    }

    /// Make every following write fail
    pub fn fail_writes(&self, error: TransportError) {
        self.state.borrow_mut().fail_writes = Some(error);
    }

    pub fn set_sensor(&self, node: NodeId, sensor: SensorType, value: f64) {
        let raw = sensor_to_fixed(value).unwrap_or(0);
        self.state.borrow_mut().sensors.insert((node, sensor), raw);
    }

    pub fn binding(&self, node: NodeId, sensor: SensorType) -> SensorOutputBinding {
        self.state
            .borrow()
            .bindings
            .get(&(node, sensor))
            .copied()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.clone()
    }

    /// Requests in the order they were written
    pub fn sent(&self) -> Vec<(NodeId, Request)> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Sent { to, request } => Some((*to, *request)),
                SimEvent::Replied { .. } => None,
            })
            .collect()
    }

    /// Group ids of every trigger broadcast
    pub fn triggers(&self) -> Vec<u8> {
        self.sent()
            .iter()
            .filter_map(|(_, r)| match r {
                Request::ExecuteMoveGroup { group_id, .. } => Some(*group_id),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.sent()
            .iter()
            .filter(|(_, r)| *r == Request::StopRequest)
            .count()
    }

    /// Deliver every reply that is due
    fn flush(&self) {
        let now = Instant::now();
        let mut due = {
            let mut state = self.state.borrow_mut();
            let (due, later): (Vec<Scheduled>, Vec<Scheduled>) =
                state.outbox.drain(..).partition(|s| s.at <= now);
            state.outbox = later;
            due
        };
        due.sort_by_key(|s| s.at);

        for scheduled in due {
            let group = match scheduled.response {
                Response::MoveCompleted { group_id, .. }
                | Response::TipActionResponse { group_id, .. } => Some(group_id),
                _ => None,
            };
            self.state.borrow_mut().events.push(SimEvent::Replied {
                from: scheduled.from,
                response: scheduled.response,
                group,
            });
            if let Ok(frame) = scheduled.response.to_frame(scheduled.from) {
                self.hub.deliver(frame);
            }
        }
    }

    /// Run the simulated nodes forever
    pub async fn drive(&self) -> Infallible {
        loop {
            self.flush();
            Timer::after(Duration::from_millis(1)).await;
        }
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CanBus for SimBus {
    async fn write(&self, frame: &CanFrame) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.fail_writes {
            return Err(error);
        }
        let to = frame.id.destination()?;
        let request = Request::from_frame(frame)?;
        state.events.push(SimEvent::Sent { to, request });
        state.handle(to, request, Instant::now());
        Ok(())
    }

    fn hub(&self) -> &MessageHub {
        &self.hub
    }
}

/// Run `fut` to completion while the simulated nodes answer
pub fn run_with<F: Future>(bus: &SimBus, fut: F) -> F::Output {
    match block_on(select(fut, bus.drive())) {
        Either::First(output) => output,
        Either::Second(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_replies_after_duration() {
        let bus = SimBus::new();
        let mut listener = bus.hub().listen().unwrap();
        let stage = Request::AddLinearMove {
            group_id: 0,
            seq_id: 0,
            duration: 1_700,
            velocity: 0,
            acceleration: 0,
            stop_condition: aliquot_protocol::StopCondition::None,
        };
        let trigger = Request::ExecuteMoveGroup {
            group_id: 0,
            start_trigger: Default::default(),
            cancel_trigger: Default::default(),
        };

        let incoming = run_with(&bus, async {
            bus.write(&stage.to_frame(NodeId::GantryX).unwrap()).await.unwrap();
            bus.write(&trigger.to_frame(NodeId::Broadcast).unwrap())
                .await
                .unwrap();
            listener.next().await
        });
        assert_eq!(incoming.sender, NodeId::GantryX);
        assert!(matches!(
            incoming.response,
            Response::MoveCompleted {
                ack: AckKind::CompleteWithoutCondition,
                ..
            }
        ));
        assert_eq!(bus.triggers(), [0]);
    }
}
