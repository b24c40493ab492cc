//! The outbound JSON shapes delivered to WebSocket subscribers: one
//! envelope per flush tick, wrapping an ordered list of decoded messages.

use serde::Serialize;

use crate::frame::Message;
use crate::value::{EventData, OperationRequest, OperationResponse};

/// One decoded message, tagged by `code` with its payload under
/// `dictionary` — matching the legacy client's expected shape exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "lowercase")]
pub enum OutboundMessage {
    Event { dictionary: EventData },
    Request { dictionary: OperationRequest },
    Response { dictionary: OperationResponse },
}

impl From<Message> for OutboundMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Event(e) => OutboundMessage::Event { dictionary: e },
            Message::Request(r) => OutboundMessage::Request { dictionary: r },
            Message::Response(r) => OutboundMessage::Response { dictionary: r },
        }
    }
}

/// The batch envelope written to the wire once per flush tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchEnvelope {
    Batch { messages: Vec<OutboundMessage> },
}

impl BatchEnvelope {
    pub fn new(messages: Vec<OutboundMessage>) -> Self {
        BatchEnvelope::Batch { messages }
    }

    /// Serializes to the exact wire text sent over the WebSocket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// An inbound message accepted from a subscriber socket. Anything else is
/// ignored rather than rejected.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Logs { logs: Vec<serde_json::Value> },
    #[serde(other)]
    Unknown,
}
