//! Bus node addresses
//!
//! Every controller on the bus owns a fixed 7-bit address. The host sits at
//! `0x10`, and `0x00` is reserved for broadcast.

/// A controller addressable on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeId {
    /// Broadcast address (every node listens)
    Broadcast,
    /// The host computer
    Host,
    /// Gripper main board
    Gripper,
    /// Gripper vertical axis
    GripperZ,
    /// Gripper jaw motor
    GripperG,
    /// Gantry X axis
    GantryX,
    /// Gantry Y axis
    GantryY,
    /// Head board
    Head,
    /// Left mount Z axis
    HeadL,
    /// Right mount Z axis
    HeadR,
    /// Left pipette (plunger and gear motors)
    PipetteLeft,
    /// Right pipette
    PipetteRight,
}

const ADDR_BROADCAST: u8 = 0x00;
const ADDR_HOST: u8 = 0x10;
const ADDR_GRIPPER: u8 = 0x20;
const ADDR_GRIPPER_Z: u8 = 0x21;
const ADDR_GRIPPER_G: u8 = 0x22;
const ADDR_GANTRY_X: u8 = 0x30;
const ADDR_GANTRY_Y: u8 = 0x40;
const ADDR_HEAD: u8 = 0x50;
const ADDR_HEAD_L: u8 = 0x51;
const ADDR_HEAD_R: u8 = 0x52;
const ADDR_PIPETTE_LEFT: u8 = 0x60;
const ADDR_PIPETTE_RIGHT: u8 = 0x70;

impl NodeId {
    /// Every node that can take part in a move group
    pub const MOTION_NODES: [NodeId; 10] = [
        NodeId::Gripper,
        NodeId::GripperZ,
        NodeId::GripperG,
        NodeId::GantryX,
        NodeId::GantryY,
        NodeId::Head,
        NodeId::HeadL,
        NodeId::HeadR,
        NodeId::PipetteLeft,
        NodeId::PipetteRight,
    ];

    /// Parse a node from its bus address
    pub fn from_address(address: u8) -> Option<Self> {
        match address {
            ADDR_BROADCAST => Some(NodeId::Broadcast),
            ADDR_HOST => Some(NodeId::Host),
            ADDR_GRIPPER => Some(NodeId::Gripper),
            ADDR_GRIPPER_Z => Some(NodeId::GripperZ),
            ADDR_GRIPPER_G => Some(NodeId::GripperG),
            ADDR_GANTRY_X => Some(NodeId::GantryX),
            ADDR_GANTRY_Y => Some(NodeId::GantryY),
            ADDR_HEAD => Some(NodeId::Head),
            ADDR_HEAD_L => Some(NodeId::HeadL),
            ADDR_HEAD_R => Some(NodeId::HeadR),
            ADDR_PIPETTE_LEFT => Some(NodeId::PipetteLeft),
            ADDR_PIPETTE_RIGHT => Some(NodeId::PipetteRight),
            _ => None,
        }
    }

    /// Bus address of this node
    pub fn address(self) -> u8 {
        match self {
            NodeId::Broadcast => ADDR_BROADCAST,
            NodeId::Host => ADDR_HOST,
            NodeId::Gripper => ADDR_GRIPPER,
            NodeId::GripperZ => ADDR_GRIPPER_Z,
            NodeId::GripperG => ADDR_GRIPPER_G,
            NodeId::GantryX => ADDR_GANTRY_X,
            NodeId::GantryY => ADDR_GANTRY_Y,
            NodeId::Head => ADDR_HEAD,
            NodeId::HeadL => ADDR_HEAD_L,
            NodeId::HeadR => ADDR_HEAD_R,
            NodeId::PipetteLeft => ADDR_PIPETTE_LEFT,
            NodeId::PipetteRight => ADDR_PIPETTE_RIGHT,
        }
    }

    /// Returns true for addresses that never execute moves
    pub fn is_reserved(self) -> bool {
        matches!(self, NodeId::Broadcast | NodeId::Host)
    }
}
