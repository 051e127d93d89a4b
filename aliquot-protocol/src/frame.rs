//! CAN frame layout
//!
//! Frames use the 29-bit extended identifier, split into four fields:
//!
//! ```text
//! ┌────────────┬───────────────────┬───────────┬───────────────┐
//! │ MESSAGE ID │ ORIGINATING NODE  │ NODE      │ FUNCTION CODE │
//! │ bits 18-28 │ bits 11-17        │ bits 4-10 │ bits 0-3      │
//! └────────────┴───────────────────┴───────────┴───────────────┘
//! ```
//!
//! Payload fields are big-endian. Frames carry at most 64 data bytes (CAN-FD).

use heapless::Vec;

use crate::node::NodeId;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Largest value an extended identifier can hold
pub const MAX_ARBITRATION_ID: u32 = 0x1FFF_FFFF;

const FUNCTION_CODE_BITS: u32 = 4;
const NODE_BITS: u32 = 7;
const MESSAGE_ID_BITS: u32 = 11;

const NODE_SHIFT: u32 = FUNCTION_CODE_BITS;
const ORIGIN_SHIFT: u32 = NODE_SHIFT + NODE_BITS;
const MESSAGE_ID_SHIFT: u32 = ORIGIN_SHIFT + NODE_BITS;

/// Errors that can occur while building or parsing frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Payload ended before all fields were read
    Truncated,
    /// Identifier does not fit in 29 bits
    InvalidFrame,
    /// Message id is not part of the protocol
    UnknownMessage(u16),
    /// Sender or destination address is not a known node
    UnknownNode(u8),
    /// A field holds a value outside its enumeration
    InvalidField,
}

/// Decoded 29-bit arbitration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArbitrationId {
    /// Message type identifier (11 bits)
    pub message_id: u16,
    /// Destination node address (7 bits)
    pub node: u8,
    /// Sender node address (7 bits)
    pub originating_node: u8,
    /// Function code (4 bits, unused by motion traffic)
    pub function_code: u8,
}

impl ArbitrationId {
    /// Identifier for a host-originated message to `node`
    pub fn new(message_id: u16, node: NodeId, originating_node: NodeId) -> Self {
        Self {
            message_id: message_id & mask(MESSAGE_ID_BITS) as u16,
            node: node.address(),
            originating_node: originating_node.address(),
            function_code: 0,
        }
    }

    /// Pack into the raw 29-bit value
    pub fn to_raw(&self) -> u32 {
        (self.function_code as u32 & mask(FUNCTION_CODE_BITS))
            | ((self.node as u32 & mask(NODE_BITS)) << NODE_SHIFT)
            | ((self.originating_node as u32 & mask(NODE_BITS)) << ORIGIN_SHIFT)
            | ((self.message_id as u32 & mask(MESSAGE_ID_BITS)) << MESSAGE_ID_SHIFT)
    }

    /// Unpack a raw identifier
    pub fn from_raw(raw: u32) -> Result<Self, FrameError> {
        if raw > MAX_ARBITRATION_ID {
            return Err(FrameError::InvalidFrame);
        }
        Ok(Self {
            message_id: ((raw >> MESSAGE_ID_SHIFT) & mask(MESSAGE_ID_BITS)) as u16,
            node: ((raw >> NODE_SHIFT) & mask(NODE_BITS)) as u8,
            originating_node: ((raw >> ORIGIN_SHIFT) & mask(NODE_BITS)) as u8,
            function_code: (raw & mask(FUNCTION_CODE_BITS)) as u8,
        })
    }

    /// Destination node
    pub fn destination(&self) -> Result<NodeId, FrameError> {
        NodeId::from_address(self.node).ok_or(FrameError::UnknownNode(self.node))
    }

    /// Sending node
    pub fn sender(&self) -> Result<NodeId, FrameError> {
        NodeId::from_address(self.originating_node)
            .ok_or(FrameError::UnknownNode(self.originating_node))
    }
}

const fn mask(bits: u32) -> u32 {
    (1 << bits) - 1
}

/// A CAN frame as handed to or received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    /// Arbitration identifier
    pub id: ArbitrationId,
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl CanFrame {
    /// Create a new frame with the given identifier and payload
    pub fn new(id: ArbitrationId, payload: &[u8]) -> Result<Self, FrameError> {
        let mut payload_vec = Vec::new();
        payload_vec
            .extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        Ok(Self {
            id,
            payload: payload_vec,
        })
    }

    /// Create a frame with no payload
    pub fn empty(id: ArbitrationId) -> Self {
        Self {
            id,
            payload: Vec::new(),
        }
    }

    /// Message id carried in the identifier
    pub fn message_id(&self) -> u16 {
        self.id.message_id
    }
}

/// Big-endian payload builder
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl PayloadWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one byte
    pub fn u8(mut self, value: u8) -> Result<Self, FrameError> {
        self.buf.push(value).map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(self)
    }

    /// Append a big-endian u16
    pub fn u16(self, value: u16) -> Result<Self, FrameError> {
        self.bytes(&value.to_be_bytes())
    }

    /// Append a big-endian u32
    pub fn u32(self, value: u32) -> Result<Self, FrameError> {
        self.bytes(&value.to_be_bytes())
    }

    /// Append a big-endian i32
    pub fn i32(self, value: i32) -> Result<Self, FrameError> {
        self.bytes(&value.to_be_bytes())
    }

    fn bytes(mut self, bytes: &[u8]) -> Result<Self, FrameError> {
        self.buf
            .extend_from_slice(bytes)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(self)
    }

    /// Finish into a frame
    pub fn into_frame(self, id: ArbitrationId) -> CanFrame {
        CanFrame {
            id,
            payload: self.buf,
        }
    }
}

/// Big-endian payload cursor
///
/// Trailing bytes are ignored so newer firmware may append fields.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    /// Start reading at the beginning of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or(FrameError::Truncated)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    /// Read one byte
    pub fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a big-endian u16
    pub fn u16(&mut self) -> Result<u16, FrameError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    /// Read a big-endian u32
    pub fn u32(&mut self) -> Result<u32, FrameError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    /// Read a big-endian i32
    pub fn i32(&mut self) -> Result<i32, FrameError> {
        Ok(i32::from_be_bytes(self.take()?))
    }
}
