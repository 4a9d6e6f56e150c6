//! Concrete transports

pub mod memory;
#[cfg(feature = "stomp")]
pub mod stomp;

pub use memory::{MemoryBroker, MemorySession, MemoryTransport};
#[cfg(feature = "stomp")]
pub use stomp::{StompSession, StompTransport};
