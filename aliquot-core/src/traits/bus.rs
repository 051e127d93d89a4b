//! CAN bus transport trait
//!
//! The transport only moves frames. Received frames are pushed into the
//! bus's [`MessageHub`], which fans them out to every open [`Listener`].
//! Reliability (acknowledgement, timeout, retry) is the caller's concern.

use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::pubsub::{PubSubChannel, Subscriber, WaitResult};

use aliquot_protocol::{CanFrame, FrameError, Incoming, NodeId, Request};

use crate::motion::MAX_MOVES_PER_GROUP;

/// Frames buffered per hub before the slowest listener starts lagging
///
/// A full group's acknowledgements may land in one burst, with fault reports
/// interleaved.
pub const HUB_DEPTH: usize = MAX_MOVES_PER_GROUP + 16;

/// Listeners that may be open on one hub at the same time
pub const MAX_LISTENERS: usize = 4;

type FrameChannel = PubSubChannel<CriticalSectionRawMutex, CanFrame, HUB_DEPTH, MAX_LISTENERS, 1>;

/// Errors raised by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Controller is bus-off
    BusOff,
    /// Transmit queue full
    TxOverflow,
    /// Frame could not be built
    Frame(FrameError),
    /// Every listener slot on the hub is taken
    NoListenerSlot,
}

impl From<FrameError> for TransportError {
    fn from(e: FrameError) -> Self {
        TransportError::Frame(e)
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::BusOff => write!(f, "bus off"),
            TransportError::TxOverflow => write!(f, "transmit queue full"),
            TransportError::Frame(e) => write!(f, "bad frame: {:?}", e),
            TransportError::NoListenerSlot => write!(f, "no listener slot free"),
        }
    }
}

/// Trait for CAN transports
///
/// Implementations wrap a socketcan interface, an MCU peripheral, or a
/// simulated bus. `write` takes `&self` so one transport can be shared by the
/// move dispatcher and the sensor scheduler.
pub trait CanBus {
    /// Queue a frame for transmission
    fn write(&self, frame: &CanFrame) -> impl Future<Output = Result<(), TransportError>>;

    /// Hub receiving this bus's incoming frames
    fn hub(&self) -> &MessageHub;
}

/// Fan-out point for received frames
///
/// Also owns the claim that serializes users of the (group, sequence)
/// namespace on this bus.
pub struct MessageHub {
    frames: FrameChannel,
    namespace: Mutex<CriticalSectionRawMutex, ()>,
}

/// Exclusive use of a bus's group and sequence ids
pub type NamespaceClaim<'a> = MutexGuard<'a, CriticalSectionRawMutex, ()>;

impl MessageHub {
    /// Create an empty hub
    pub const fn new() -> Self {
        Self {
            frames: PubSubChannel::new(),
            namespace: Mutex::new(()),
        }
    }

    /// Hand a received frame to every open listener
    ///
    /// Never blocks. With no listener open the frame is dropped; a listener
    /// that falls `HUB_DEPTH` frames behind loses the oldest ones.
    pub fn deliver(&self, frame: CanFrame) {
        self.frames.immediate_publisher().publish_immediate(frame);
    }

    /// Open a listener; it is removed again when dropped
    pub fn listen(&self) -> Result<Listener<'_>, TransportError> {
        self.frames
            .subscriber()
            .map(|subscriber| Listener { subscriber })
            .map_err(|_| TransportError::NoListenerSlot)
    }

    /// Wait for exclusive use of the namespace
    pub async fn claim(&self) -> NamespaceClaim<'_> {
        self.namespace.lock().await
    }

    /// Returns true if someone currently holds the namespace
    pub fn is_claimed(&self) -> bool {
        self.namespace.try_lock().is_err()
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped subscription to a hub
pub struct Listener<'a> {
    subscriber: Subscriber<'a, CriticalSectionRawMutex, CanFrame, HUB_DEPTH, MAX_LISTENERS, 1>,
}

impl Listener<'_> {
    /// Next decodable message sent by a node
    ///
    /// Frames that fail to decode and echoes of host traffic are skipped.
    pub async fn next(&mut self) -> Incoming {
        loop {
            match self.subscriber.next_message().await {
                WaitResult::Lagged(missed) => {
                    warn!("listener lagged, {} frames lost", missed);
                }
                WaitResult::Message(frame) => match Incoming::from_frame(&frame) {
                    Ok(incoming) if incoming.sender != NodeId::Host => return incoming,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("skipping frame {:?}: {:?}", frame.id, e);
                    }
                },
            }
        }
    }

    /// Next already-buffered message, without waiting
    pub fn try_next(&mut self) -> Option<Incoming> {
        while let Some(result) = self.subscriber.try_next_message() {
            if let WaitResult::Message(frame) = result {
                if let Ok(incoming) = Incoming::from_frame(&frame) {
                    if incoming.sender != NodeId::Host {
                        return Some(incoming);
                    }
                }
            }
        }
        None
    }
}

/// Request-level view of a bus
pub struct Messenger<'a, B: CanBus> {
    bus: &'a B,
}

impl<B: CanBus> Clone for Messenger<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: CanBus> Copy for Messenger<'_, B> {}

impl<'a, B: CanBus> Messenger<'a, B> {
    pub fn new(bus: &'a B) -> Self {
        Self { bus }
    }

    /// Hub of the underlying bus
    pub fn hub(&self) -> &'a MessageHub {
        self.bus.hub()
    }

    /// Send a request to one node
    pub async fn send(&self, node: NodeId, request: &Request) -> Result<(), TransportError> {
        let frame = request.to_frame(node)?;
        trace!("tx {:?} -> {:?}", request, node);
        self.bus.write(&frame).await
    }

    /// Send a request to every node
    pub async fn broadcast(&self, request: &Request) -> Result<(), TransportError> {
        self.send(NodeId::Broadcast, request).await
    }

    /// Open a scoped listener on the bus
    pub fn listen(&self) -> Result<Listener<'a>, TransportError> {
        self.hub().listen()
    }
}
