//! Events observed on a chat session stream.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::MessageEnvelope;
use crate::rotation::RotationAnnouncement;
use crate::types::{Custody, Lifetime};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Message,
    ReadReceipt,
    /// Explicit request to extend the waiter's deadline.
    Extend,
    ParticipantLeft,
    /// Anything else the server emits; kept verbatim.
    Other(String),
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "message" => Self::Message,
            "read_receipt" => Self::ReadReceipt,
            "extend" => Self::Extend,
            "participant_left" => Self::ParticipantLeft,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::ReadReceipt => "read_receipt",
            Self::Extend => "extend",
            Self::ParticipantLeft => "participant_left",
            Self::Other(raw) => raw,
        }
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub session_id: String,
    pub message_id: String,
    #[serde(alias = "from")]
    pub from_agent: String,
    pub body: String,
    pub sender_leaving: bool,
    pub sender_waiting: bool,
    pub reader_alias: String,
    #[serde(alias = "extend")]
    pub hang_on: bool,
    pub extends_wait_seconds: i64,

    /// Signed envelope for the message, when the sender signs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<MessageEnvelope>,
    pub custody: Custody,
    pub lifetime: Lifetime,
    /// Server hint for the sender, used when pinning.
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationAnnouncement>,
}

impl Event {
    /// An event with only its type set.
    pub fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Decode a stream frame.
    ///
    /// `event_type` is the frame's own type label and wins over any `type`
    /// field in the body. A body that does not parse yields a bare event of
    /// that type rather than an error.
    pub fn from_json(event_type: &str, data: &str) -> Self {
        match serde_json::from_str::<Event>(data) {
            Ok(mut event) => {
                if !event_type.is_empty() {
                    event.kind = EventKind::parse(event_type);
                }
                event
            }
            Err(err) => {
                tracing::debug!(event_type, error = %err, "undecodable event body");
                Self::bare(EventKind::parse(event_type))
            }
        }
    }

    pub fn is_message(&self) -> bool {
        self.kind == EventKind::Message
    }
}
