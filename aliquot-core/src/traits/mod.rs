//! Transport abstraction
//!
//! The interface between scheduling logic and whatever actually puts frames
//! on the bus.

pub mod bus;

pub use bus::{
    CanBus, Listener, MessageHub, Messenger, NamespaceClaim, TransportError, HUB_DEPTH,
    MAX_LISTENERS,
};
