//! Chat sessions: send a message and wait for the reply.

pub mod bridge;
pub mod engine;
pub mod events;
pub mod transport;

pub use bridge::{Bridge, BridgeItem};
pub use engine::{
    CancelHandle, CancelSignal, ChatEngine, Reply, SendOptions, SendResult, SendStatus,
};
pub use events::{Event, EventKind};
pub use transport::{Delivery, EventStream, OutgoingMessage, StreamError, Transport};
