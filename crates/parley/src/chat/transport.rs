//! Seams to the chat server. Implementations live outside this crate.

use std::time::Duration;

use async_trait::async_trait;

use crate::chat::events::Event;
use crate::envelope::MessageEnvelope;
use crate::error::Result;

/// A message handed to the transport for delivery.
#[derive(Clone, Debug, Default)]
pub struct OutgoingMessage {
    /// Existing session, or `None` to start a new conversation.
    pub session_id: Option<String>,
    pub to: Vec<String>,
    pub body: String,
    pub message_id: String,
    pub leaving: bool,
    pub waiting: bool,
    pub envelope: Option<MessageEnvelope>,
}

/// Server acknowledgement of a delivered message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub session_id: String,
    /// Server-assigned id; may be empty when the server echoes ours.
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("stream ended")]
    Ended,
    #[error("stream transport error: {0}")]
    Transport(String),
}

/// A server-side event stream for one session.
///
/// The stream must replay the caller's own outgoing message before any
/// message that was sent after it.
#[async_trait]
pub trait EventStream: Send {
    /// Wait for the next event. Dropping the returned future abandons the read.
    async fn next_event(&mut self) -> std::result::Result<Event, StreamError>;

    /// Release the underlying connection.
    async fn close(&mut self);
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<Delivery>;

    /// Open a stream on `session_id`. `safety` bounds how long the server
    /// keeps the connection alive if this client disappears.
    async fn open_stream(&self, session_id: &str, safety: Duration) -> Result<Box<dyn EventStream>>;
}
