//! Message types for the motion bus
//!
//! Message types are divided into two categories:
//! - Host → Node: move staging, group execution, sensor requests
//! - Node → Host: move acknowledgements, sensor responses, error reports

use crate::fault::{ErrorCode, ErrorSeverity};
use crate::frame::{ArbitrationId, CanFrame, FrameError, PayloadReader, PayloadWriter};
use crate::node::NodeId;

// Message type IDs: general
pub const MSG_ACKNOWLEDGEMENT: u16 = 0x01;
pub const MSG_ERROR: u16 = 0x02;
pub const MSG_STOP_REQUEST: u16 = 0x03;

// Message type IDs: motion
pub const MSG_MOVE_COMPLETED: u16 = 0x13;
pub const MSG_ADD_LINEAR_MOVE: u16 = 0x15;
pub const MSG_EXECUTE_MOVE_GROUP: u16 = 0x18;
pub const MSG_CLEAR_ALL_MOVE_GROUPS: u16 = 0x19;
pub const MSG_HOME_REQUEST: u16 = 0x20;
pub const MSG_GRIPPER_MOVE: u16 = 0x21;
pub const MSG_TIP_ACTION_REQUEST: u16 = 0x24;
pub const MSG_TIP_ACTION_RESPONSE: u16 = 0x25;

// Message type IDs: sensors
pub const MSG_READ_SENSOR_REQUEST: u16 = 0x82;
pub const MSG_WRITE_SENSOR_REQUEST: u16 = 0x83;
pub const MSG_BASELINE_SENSOR_REQUEST: u16 = 0x84;
pub const MSG_READ_SENSOR_RESPONSE: u16 = 0x85;
pub const MSG_SET_SENSOR_THRESHOLD_REQUEST: u16 = 0x86;
pub const MSG_SENSOR_THRESHOLD_RESPONSE: u16 = 0x87;
pub const MSG_BIND_SENSOR_OUTPUT_REQUEST: u16 = 0x8A;

/// Condition that ends a move before its duration elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopCondition {
    /// Run for the full duration
    #[default]
    None,
    /// Stop when the limit switch closes
    LimitSwitch,
    /// Stop when the sync line is asserted
    SyncLine,
    /// Stop when the encoder reaches the target
    EncoderPosition,
    /// Stop when grip force is reached
    GripperForce,
    /// Stop on a detected stall
    Stall,
    /// Keep moving through stalls
    IgnoreStalls,
    /// Back off the limit switch until it opens
    LimitSwitchBackoff,
}

impl StopCondition {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(StopCondition::None),
            0x01 => Some(StopCondition::LimitSwitch),
            0x02 => Some(StopCondition::SyncLine),
            0x04 => Some(StopCondition::EncoderPosition),
            0x08 => Some(StopCondition::GripperForce),
            0x10 => Some(StopCondition::Stall),
            0x20 => Some(StopCondition::IgnoreStalls),
            0x40 => Some(StopCondition::LimitSwitchBackoff),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            StopCondition::None => 0x00,
            StopCondition::LimitSwitch => 0x01,
            StopCondition::SyncLine => 0x02,
            StopCondition::EncoderPosition => 0x04,
            StopCondition::GripperForce => 0x08,
            StopCondition::Stall => 0x10,
            StopCondition::IgnoreStalls => 0x20,
            StopCondition::LimitSwitchBackoff => 0x40,
        }
    }

    /// Returns true if the move ends on a mechanical end-stop
    pub fn is_limit_switch(self) -> bool {
        matches!(
            self,
            StopCondition::LimitSwitch | StopCondition::LimitSwitchBackoff
        )
    }
}

/// How a node finished a queued move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckKind {
    /// Ran the full duration
    CompleteWithoutCondition,
    /// Ended early because its stop condition was met
    StoppedByCondition,
    /// Ran out of time before the stop condition was met
    Timeout,
    /// Encoder and commanded position disagree
    PositionError,
}

impl AckKind {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(AckKind::CompleteWithoutCondition),
            0x02 => Some(AckKind::StoppedByCondition),
            0x03 => Some(AckKind::Timeout),
            0x04 => Some(AckKind::PositionError),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            AckKind::CompleteWithoutCondition => 0x01,
            AckKind::StoppedByCondition => 0x02,
            AckKind::Timeout => 0x03,
            AckKind::PositionError => 0x04,
        }
    }
}

/// Validity flags reported with a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PositionFlags(pub u8);

impl PositionFlags {
    pub const STEPPER_POSITION_OK: u8 = 0x01;
    pub const ENCODER_POSITION_OK: u8 = 0x02;

    /// Both positions valid
    pub const fn all_ok() -> Self {
        Self(Self::STEPPER_POSITION_OK | Self::ENCODER_POSITION_OK)
    }

    /// Stepper (commanded) position is trustworthy
    pub fn motor_ok(self) -> bool {
        self.0 & Self::STEPPER_POSITION_OK != 0
    }

    /// Encoder position is trustworthy
    pub fn encoder_ok(self) -> bool {
        self.0 & Self::ENCODER_POSITION_OK != 0
    }
}

/// Gear-motor action on a multi-channel pipette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TipAction {
    PickUp,
    Drop,
    Home,
}

impl TipAction {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(TipAction::PickUp),
            0x01 => Some(TipAction::Drop),
            0x02 => Some(TipAction::Home),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            TipAction::PickUp => 0x00,
            TipAction::Drop => 0x01,
            TipAction::Home => 0x02,
        }
    }
}

/// What starts a staged group once it is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartTrigger {
    /// Start on receipt of the execute request
    #[default]
    Immediate,
    /// Start when the sync line is asserted
    SyncLine,
}

/// What cancels a running group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CancelTrigger {
    #[default]
    None,
    SyncLine,
}

/// Sensor families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorType {
    Tip,
    Capacitive,
    Environment,
    Pressure,
    PressureTemperature,
    Humidity,
    Temperature,
}

impl SensorType {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SensorType::Tip),
            0x01 => Some(SensorType::Capacitive),
            0x02 => Some(SensorType::Environment),
            0x03 => Some(SensorType::Pressure),
            0x04 => Some(SensorType::PressureTemperature),
            0x05 => Some(SensorType::Humidity),
            0x06 => Some(SensorType::Temperature),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            SensorType::Tip => 0x00,
            SensorType::Capacitive => 0x01,
            SensorType::Environment => 0x02,
            SensorType::Pressure => 0x03,
            SensorType::PressureTemperature => 0x04,
            SensorType::Humidity => 0x05,
            SensorType::Temperature => 0x06,
        }
    }
}

/// Which instance of a sensor type on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorId {
    #[default]
    S0,
    S1,
    Both,
}

impl SensorId {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SensorId::S0),
            0x01 => Some(SensorId::S1),
            0x02 => Some(SensorId::Both),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            SensorId::S0 => 0x00,
            SensorId::S1 => 0x01,
            SensorId::Both => 0x02,
        }
    }
}

/// Where a sensor's threshold output is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorOutputBinding {
    #[default]
    None,
    /// Drive the sync line when the threshold is crossed
    Sync,
    /// Stream readings to the host
    Report,
    SyncAndReport,
}

impl SensorOutputBinding {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SensorOutputBinding::None),
            0x01 => Some(SensorOutputBinding::Sync),
            0x02 => Some(SensorOutputBinding::Report),
            0x03 => Some(SensorOutputBinding::SyncAndReport),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            SensorOutputBinding::None => 0x00,
            SensorOutputBinding::Sync => 0x01,
            SensorOutputBinding::Report => 0x02,
            SensorOutputBinding::SyncAndReport => 0x03,
        }
    }
}

/// How a threshold value is interpreted by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorThresholdMode {
    /// Threshold is an absolute reading
    #[default]
    Absolute,
    /// Threshold is an offset from a fresh baseline
    AutoBaseline,
}

impl SensorThresholdMode {
    /// Parse from wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SensorThresholdMode::Absolute),
            0x01 => Some(SensorThresholdMode::AutoBaseline),
            _ => None,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            SensorThresholdMode::Absolute => 0x00,
            SensorThresholdMode::AutoBaseline => 0x01,
        }
    }
}

fn field<T>(value: Option<T>) -> Result<T, FrameError> {
    value.ok_or(FrameError::InvalidField)
}

/// Messages from the host to nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Drop every staged move group
    ClearAllMoveGroups,
    /// Stage a linear move
    AddLinearMove {
        group_id: u8,
        seq_id: u8,
        /// Interrupt ticks
        duration: u32,
        /// Q31 mm/tick
        velocity: i32,
        /// Q31 mm/tick²
        acceleration: i32,
        stop_condition: StopCondition,
    },
    /// Stage a homing move (always ends on the limit switch)
    HomeRequest {
        group_id: u8,
        seq_id: u8,
        duration: u32,
        velocity: i32,
    },
    /// Stage a gripper jaw move
    GripperMove {
        group_id: u8,
        seq_id: u8,
        duration: u32,
        /// PWM duty cycle in percent
        duty_cycle: u32,
        encoder_position_um: i32,
        stay_engaged: bool,
        stop_condition: StopCondition,
    },
    /// Stage a gear-motor tip action
    TipAction {
        group_id: u8,
        seq_id: u8,
        duration: u32,
        velocity: i32,
        action: TipAction,
        stop_condition: StopCondition,
    },
    /// Start a staged group
    ExecuteMoveGroup {
        group_id: u8,
        start_trigger: StartTrigger,
        cancel_trigger: CancelTrigger,
    },
    /// Halt all motion immediately
    StopRequest,
    ReadSensor {
        sensor: SensorType,
        sensor_id: SensorId,
        offset_reading: bool,
    },
    WriteSensor {
        sensor: SensorType,
        sensor_id: SensorId,
        data: u32,
    },
    BaselineSensor {
        sensor: SensorType,
        sensor_id: SensorId,
        sample_rate: u16,
    },
    SetSensorThreshold {
        sensor: SensorType,
        sensor_id: SensorId,
        /// Q16 threshold
        threshold: i32,
        mode: SensorThresholdMode,
    },
    BindSensorOutput {
        sensor: SensorType,
        sensor_id: SensorId,
        binding: SensorOutputBinding,
    },
}

impl Request {
    /// Message id of this request
    pub fn message_id(&self) -> u16 {
        match self {
            Request::ClearAllMoveGroups => MSG_CLEAR_ALL_MOVE_GROUPS,
            Request::AddLinearMove { .. } => MSG_ADD_LINEAR_MOVE,
            Request::HomeRequest { .. } => MSG_HOME_REQUEST,
            Request::GripperMove { .. } => MSG_GRIPPER_MOVE,
            Request::TipAction { .. } => MSG_TIP_ACTION_REQUEST,
            Request::ExecuteMoveGroup { .. } => MSG_EXECUTE_MOVE_GROUP,
            Request::StopRequest => MSG_STOP_REQUEST,
            Request::ReadSensor { .. } => MSG_READ_SENSOR_REQUEST,
            Request::WriteSensor { .. } => MSG_WRITE_SENSOR_REQUEST,
            Request::BaselineSensor { .. } => MSG_BASELINE_SENSOR_REQUEST,
            Request::SetSensorThreshold { .. } => MSG_SET_SENSOR_THRESHOLD_REQUEST,
            Request::BindSensorOutput { .. } => MSG_BIND_SENSOR_OUTPUT_REQUEST,
        }
    }

    /// Staged-move tag, for requests that add a move to a group
    pub fn move_tag(&self) -> Option<(u8, u8)> {
        match *self {
            Request::AddLinearMove { group_id, seq_id, .. }
            | Request::HomeRequest { group_id, seq_id, .. }
            | Request::GripperMove { group_id, seq_id, .. }
            | Request::TipAction { group_id, seq_id, .. } => Some((group_id, seq_id)),
            _ => None,
        }
    }

    /// Encode this request into a host-originated frame for `destination`
    pub fn to_frame(&self, destination: NodeId) -> Result<CanFrame, FrameError> {
        let id = ArbitrationId::new(self.message_id(), destination, NodeId::Host);
        let w = PayloadWriter::new();
        let w = match *self {
            Request::ClearAllMoveGroups | Request::StopRequest => w,
            Request::AddLinearMove {
                group_id,
                seq_id,
                duration,
                velocity,
                acceleration,
                stop_condition,
            } => w
                .u8(group_id)?
                .u8(seq_id)?
                .u32(duration)?
                .i32(velocity)?
                .i32(acceleration)?
                .u8(stop_condition.to_byte())?,
            Request::HomeRequest {
                group_id,
                seq_id,
                duration,
                velocity,
            } => w.u8(group_id)?.u8(seq_id)?.u32(duration)?.i32(velocity)?,
            Request::GripperMove {
                group_id,
                seq_id,
                duration,
                duty_cycle,
                encoder_position_um,
                stay_engaged,
                stop_condition,
            } => w
                .u8(group_id)?
                .u8(seq_id)?
                .u32(duration)?
                .u32(duty_cycle)?
                .i32(encoder_position_um)?
                .u8(stay_engaged as u8)?
                .u8(stop_condition.to_byte())?,
            Request::TipAction {
                group_id,
                seq_id,
                duration,
                velocity,
                action,
                stop_condition,
            } => w
                .u8(group_id)?
                .u8(seq_id)?
                .u32(duration)?
                .i32(velocity)?
                .u8(action.to_byte())?
                .u8(stop_condition.to_byte())?,
            Request::ExecuteMoveGroup {
                group_id,
                start_trigger,
                cancel_trigger,
            } => w
                .u8(group_id)?
                .u8(start_trigger as u8)?
                .u8(cancel_trigger as u8)?,
            Request::ReadSensor {
                sensor,
                sensor_id,
                offset_reading,
            } => w
                .u8(sensor.to_byte())?
                .u8(sensor_id.to_byte())?
                .u8(offset_reading as u8)?,
            Request::WriteSensor {
                sensor,
                sensor_id,
                data,
            } => w.u8(sensor.to_byte())?.u8(sensor_id.to_byte())?.u32(data)?,
            Request::BaselineSensor {
                sensor,
                sensor_id,
                sample_rate,
            } => w
                .u8(sensor.to_byte())?
                .u8(sensor_id.to_byte())?
                .u16(sample_rate)?,
            Request::SetSensorThreshold {
                sensor,
                sensor_id,
                threshold,
                mode,
            } => w
                .u8(sensor.to_byte())?
                .u8(sensor_id.to_byte())?
                .i32(threshold)?
                .u8(mode.to_byte())?,
            Request::BindSensorOutput {
                sensor,
                sensor_id,
                binding,
            } => w
                .u8(sensor.to_byte())?
                .u8(sensor_id.to_byte())?
                .u8(binding.to_byte())?,
        };
        Ok(w.into_frame(id))
    }

    /// Parse a request from a frame (for simulated nodes and bus sniffing)
    pub fn from_frame(frame: &CanFrame) -> Result<Self, FrameError> {
        let mut r = PayloadReader::new(&frame.payload);
        match frame.message_id() {
            MSG_CLEAR_ALL_MOVE_GROUPS => Ok(Request::ClearAllMoveGroups),
            MSG_STOP_REQUEST => Ok(Request::StopRequest),
            MSG_ADD_LINEAR_MOVE => Ok(Request::AddLinearMove {
                group_id: r.u8()?,
                seq_id: r.u8()?,
                duration: r.u32()?,
                velocity: r.i32()?,
                acceleration: r.i32()?,
                stop_condition: field(StopCondition::from_byte(r.u8()?))?,
            }),
            MSG_HOME_REQUEST => Ok(Request::HomeRequest {
                group_id: r.u8()?,
                seq_id: r.u8()?,
                duration: r.u32()?,
                velocity: r.i32()?,
            }),
            MSG_GRIPPER_MOVE => Ok(Request::GripperMove {
                group_id: r.u8()?,
                seq_id: r.u8()?,
                duration: r.u32()?,
                duty_cycle: r.u32()?,
                encoder_position_um: r.i32()?,
                stay_engaged: r.u8()? != 0,
                stop_condition: field(StopCondition::from_byte(r.u8()?))?,
            }),
            MSG_TIP_ACTION_REQUEST => Ok(Request::TipAction {
                group_id: r.u8()?,
                seq_id: r.u8()?,
                duration: r.u32()?,
                velocity: r.i32()?,
                action: field(TipAction::from_byte(r.u8()?))?,
                stop_condition: field(StopCondition::from_byte(r.u8()?))?,
            }),
            MSG_EXECUTE_MOVE_GROUP => Ok(Request::ExecuteMoveGroup {
                group_id: r.u8()?,
                start_trigger: match r.u8()? {
                    0 => StartTrigger::Immediate,
                    1 => StartTrigger::SyncLine,
                    _ => return Err(FrameError::InvalidField),
                },
                cancel_trigger: match r.u8()? {
                    0 => CancelTrigger::None,
                    1 => CancelTrigger::SyncLine,
                    _ => return Err(FrameError::InvalidField),
                },
            }),
            MSG_READ_SENSOR_REQUEST => Ok(Request::ReadSensor {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                offset_reading: r.u8()? != 0,
            }),
            MSG_WRITE_SENSOR_REQUEST => Ok(Request::WriteSensor {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                data: r.u32()?,
            }),
            MSG_BASELINE_SENSOR_REQUEST => Ok(Request::BaselineSensor {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                sample_rate: r.u16()?,
            }),
            MSG_SET_SENSOR_THRESHOLD_REQUEST => Ok(Request::SetSensorThreshold {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                threshold: r.i32()?,
                mode: field(SensorThresholdMode::from_byte(r.u8()?))?,
            }),
            MSG_BIND_SENSOR_OUTPUT_REQUEST => Ok(Request::BindSensorOutput {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                binding: field(SensorOutputBinding::from_byte(r.u8()?))?,
            }),
            other => Err(FrameError::UnknownMessage(other)),
        }
    }
}

/// Messages from nodes to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// Generic acknowledgement
    Acknowledgement,
    /// A staged move finished
    MoveCompleted {
        group_id: u8,
        seq_id: u8,
        current_position_um: i32,
        encoder_position_um: i32,
        position_flags: PositionFlags,
        ack: AckKind,
    },
    /// A staged tip action finished
    TipActionResponse {
        group_id: u8,
        seq_id: u8,
        current_position_um: i32,
        encoder_position_um: i32,
        position_flags: PositionFlags,
        ack: AckKind,
        action: TipAction,
        success: bool,
    },
    /// Asynchronous fault report
    ErrorMessage {
        severity: ErrorSeverity,
        code: ErrorCode,
    },
    ReadSensorResponse {
        sensor: SensorType,
        sensor_id: SensorId,
        /// Q16 reading
        value: i32,
    },
    SensorThresholdResponse {
        sensor: SensorType,
        sensor_id: SensorId,
        threshold: i32,
        mode: SensorThresholdMode,
    },
}

impl Response {
    /// Message id of this response
    pub fn message_id(&self) -> u16 {
        match self {
            Response::Acknowledgement => MSG_ACKNOWLEDGEMENT,
            Response::MoveCompleted { .. } => MSG_MOVE_COMPLETED,
            Response::TipActionResponse { .. } => MSG_TIP_ACTION_RESPONSE,
            Response::ErrorMessage { .. } => MSG_ERROR,
            Response::ReadSensorResponse { .. } => MSG_READ_SENSOR_RESPONSE,
            Response::SensorThresholdResponse { .. } => MSG_SENSOR_THRESHOLD_RESPONSE,
        }
    }

    /// Parse a response from a frame
    pub fn from_frame(frame: &CanFrame) -> Result<Self, FrameError> {
        let mut r = PayloadReader::new(&frame.payload);
        match frame.message_id() {
            MSG_ACKNOWLEDGEMENT => Ok(Response::Acknowledgement),
            MSG_MOVE_COMPLETED => Ok(Response::MoveCompleted {
                group_id: r.u8()?,
                seq_id: r.u8()?,
                current_position_um: r.i32()?,
                encoder_position_um: r.i32()?,
                position_flags: PositionFlags(r.u8()?),
                ack: field(AckKind::from_byte(r.u8()?))?,
            }),
            MSG_TIP_ACTION_RESPONSE => Ok(Response::TipActionResponse {
                group_id: r.u8()?,
                seq_id: r.u8()?,
                current_position_um: r.i32()?,
                encoder_position_um: r.i32()?,
                position_flags: PositionFlags(r.u8()?),
                ack: field(AckKind::from_byte(r.u8()?))?,
                action: field(TipAction::from_byte(r.u8()?))?,
                success: r.u8()? != 0,
            }),
            MSG_ERROR => Ok(Response::ErrorMessage {
                severity: ErrorSeverity::from_byte(r.u8()?),
                code: ErrorCode::from_u16(r.u16()?),
            }),
            MSG_READ_SENSOR_RESPONSE => Ok(Response::ReadSensorResponse {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                value: r.i32()?,
            }),
            MSG_SENSOR_THRESHOLD_RESPONSE => Ok(Response::SensorThresholdResponse {
                sensor: field(SensorType::from_byte(r.u8()?))?,
                sensor_id: field(SensorId::from_byte(r.u8()?))?,
                threshold: r.i32()?,
                mode: field(SensorThresholdMode::from_byte(r.u8()?))?,
            }),
            other => Err(FrameError::UnknownMessage(other)),
        }
    }

    /// Encode this response as sent by `sender` (for simulated nodes)
    pub fn to_frame(&self, sender: NodeId) -> Result<CanFrame, FrameError> {
        let id = ArbitrationId::new(self.message_id(), NodeId::Host, sender);
        let w = PayloadWriter::new();
        let w = match *self {
            Response::Acknowledgement => w,
            Response::MoveCompleted {
                group_id,
                seq_id,
                current_position_um,
                encoder_position_um,
                position_flags,
                ack,
            } => w
                .u8(group_id)?
                .u8(seq_id)?
                .i32(current_position_um)?
                .i32(encoder_position_um)?
                .u8(position_flags.0)?
                .u8(ack.to_byte())?,
            Response::TipActionResponse {
                group_id,
                seq_id,
                current_position_um,
                encoder_position_um,
                position_flags,
                ack,
                action,
                success,
            } => w
                .u8(group_id)?
                .u8(seq_id)?
                .i32(current_position_um)?
                .i32(encoder_position_um)?
                .u8(position_flags.0)?
                .u8(ack.to_byte())?
                .u8(action.to_byte())?
                .u8(success as u8)?,
            Response::ErrorMessage { severity, code } => {
                w.u8(severity.to_byte())?.u16(code.to_u16())?
            }
            Response::ReadSensorResponse {
                sensor,
                sensor_id,
                value,
            } => w.u8(sensor.to_byte())?.u8(sensor_id.to_byte())?.i32(value)?,
            Response::SensorThresholdResponse {
                sensor,
                sensor_id,
                threshold,
                mode,
            } => w
                .u8(sensor.to_byte())?
                .u8(sensor_id.to_byte())?
                .i32(threshold)?
                .u8(mode.to_byte())?,
        };
        Ok(w.into_frame(id))
    }
}

/// A decoded response tagged with its sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Incoming {
    pub sender: NodeId,
    pub response: Response,
}

impl Incoming {
    /// Decode a received frame
    pub fn from_frame(frame: &CanFrame) -> Result<Self, FrameError> {
        Ok(Self {
            sender: frame.id.sender()?,
            response: Response::from_frame(frame)?,
        })
    }
}
