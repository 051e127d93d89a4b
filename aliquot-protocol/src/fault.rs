//! Firmware-reported error codes and severities

/// Error code carried by an `ErrorMessage`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    InvalidSize,
    BadChecksum,
    InvalidByteCount,
    InvalidInput,
    Hardware,
    Timeout,
    /// Emergency stop pressed
    EstopDetected,
    /// Stall or collision detected by the motor driver
    CollisionDetected,
    /// Gripper lost its labware
    LabwareDropped,
    EstopReleased,
    /// Move queued while the motor was already busy
    MotorBusy,
    /// Node stopped because a stop request was received
    StopRequested,
    /// Pipette pressure sensor over its safe range
    OverPressure,
    DoorOpen,
    ReedOpen,
    MotorDriverError,
    SafetyRelayInactive,
    /// Code not known to this host
    Unknown(u16),
}

impl ErrorCode {
    /// Parse an error code from its wire value
    pub fn from_u16(code: u16) -> Self {
        match code {
            0x0001 => ErrorCode::InvalidSize,
            0x0002 => ErrorCode::BadChecksum,
            0x0003 => ErrorCode::InvalidByteCount,
            0x0004 => ErrorCode::InvalidInput,
            0x0005 => ErrorCode::Hardware,
            0x0006 => ErrorCode::Timeout,
            0x0007 => ErrorCode::EstopDetected,
            0x0008 => ErrorCode::CollisionDetected,
            0x0009 => ErrorCode::LabwareDropped,
            0x000A => ErrorCode::EstopReleased,
            0x000B => ErrorCode::MotorBusy,
            0x000C => ErrorCode::StopRequested,
            0x000D => ErrorCode::OverPressure,
            0x000E => ErrorCode::DoorOpen,
            0x000F => ErrorCode::ReedOpen,
            0x0010 => ErrorCode::MotorDriverError,
            0x0011 => ErrorCode::SafetyRelayInactive,
            other => ErrorCode::Unknown(other),
        }
    }

    /// Wire value
    pub fn to_u16(self) -> u16 {
        match self {
            ErrorCode::InvalidSize => 0x0001,
            ErrorCode::BadChecksum => 0x0002,
            ErrorCode::InvalidByteCount => 0x0003,
            ErrorCode::InvalidInput => 0x0004,
            ErrorCode::Hardware => 0x0005,
            ErrorCode::Timeout => 0x0006,
            ErrorCode::EstopDetected => 0x0007,
            ErrorCode::CollisionDetected => 0x0008,
            ErrorCode::LabwareDropped => 0x0009,
            ErrorCode::EstopReleased => 0x000A,
            ErrorCode::MotorBusy => 0x000B,
            ErrorCode::StopRequested => 0x000C,
            ErrorCode::OverPressure => 0x000D,
            ErrorCode::DoorOpen => 0x000E,
            ErrorCode::ReedOpen => 0x000F,
            ErrorCode::MotorDriverError => 0x0010,
            ErrorCode::SafetyRelayInactive => 0x0011,
            ErrorCode::Unknown(code) => code,
        }
    }
}

/// How serious a node considers an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorSeverity {
    /// Informational, motion continues
    Warning,
    /// The node stopped but can be commanded again
    Recoverable,
    /// The node needs intervention
    Unrecoverable,
}

const SEVERITY_WARNING: u8 = 0x01;
const SEVERITY_RECOVERABLE: u8 = 0x02;
const SEVERITY_UNRECOVERABLE: u8 = 0x03;

impl ErrorSeverity {
    /// Parse from wire byte
    ///
    /// Unknown values are read as unrecoverable.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            SEVERITY_WARNING => ErrorSeverity::Warning,
            SEVERITY_RECOVERABLE => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Unrecoverable,
        }
    }

    /// Convert to wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            ErrorSeverity::Warning => SEVERITY_WARNING,
            ErrorSeverity::Recoverable => SEVERITY_RECOVERABLE,
            ErrorSeverity::Unrecoverable => SEVERITY_UNRECOVERABLE,
        }
    }
}
