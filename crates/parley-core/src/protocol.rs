//! Wire protocol for the chat relay.
//!
//! One JSON object per WebSocket text frame in both directions. Inbound
//! frames carry a `type` discriminator; only `"message"` frames are acted
//! on. Outbound events are tagged the same way.

use serde::{Deserialize, Serialize};

use crate::ids::ChatAddr;

/// Sender label stamped on every relayed `message` event, regardless of the
/// label the client supplied (the client's label is persisted, not relayed).
pub const RELAYED_SENDER: &str = "customer";

/// Raw inbound frame as clients send it.
///
/// `message` and `sender` are optional at the parse level; validation of the
/// body happens in [`parse_chat`].
#[derive(Clone, Debug, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Option<String>,
    pub sender: Option<String>,
}

/// A validated chat message extracted from a [`ClientFrame`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Non-empty message body.
    pub body: String,
    /// Client-supplied sender label. Untrusted; persisted as-is.
    pub sender: Option<String>,
}

/// Why an inbound frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload was not well-formed JSON (or not the expected shape).
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame parsed as a message but the body was missing or empty.
    #[error("message body is missing")]
    MissingBody,
}

/// Parse and validate one inbound text frame.
///
/// Returns `Ok(None)` for well-formed frames whose `type` is not
/// `"message"` — those are ignored without any response or log.
///
/// # Errors
///
/// [`FrameError::Malformed`] if the payload is not valid JSON,
/// [`FrameError::MissingBody`] if a `message` frame has no non-empty body.
pub fn parse_chat(text: &str) -> Result<Option<ChatMessage>, FrameError> {
    let frame: ClientFrame = serde_json::from_str(text)?;
    if frame.kind != "message" {
        return Ok(None);
    }
    match frame.message {
        Some(body) if !body.is_empty() => Ok(Some(ChatMessage {
            body,
            sender: frame.sender,
        })),
        _ => Err(FrameError::MissingBody),
    }
}

/// One stored message as replayed in a `history` event.
///
/// `sender` serializes as `null` when the original frame carried no label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub content: String,
    pub sender: Option<String>,
}

/// Outbound events, tagged by `type` on the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Sent once per connection, immediately after registration.
    #[serde(rename = "welcome")]
    Welcome { ip: String },

    /// Sent once per connection, after the welcome; the address's stored
    /// messages in storage order.
    #[serde(rename = "history")]
    History { messages: Vec<HistoryEntry> },

    /// Sent to privileged connections only, when a privileged connection
    /// registers.
    #[serde(rename = "activeChats")]
    ActiveChats {
        #[serde(rename = "activeChats")]
        active_chats: Vec<String>,
    },

    /// Relayed chat message, fanned out to every connection.
    #[serde(rename = "message")]
    Message {
        message: String,
        ip: String,
        sender: String,
    },
}

impl ServerEvent {
    /// Build the relayed `message` event for a chat message from `addr`.
    pub fn relayed(addr: &ChatAddr, body: String) -> Self {
        Self::Message {
            message: body,
            ip: addr.to_string(),
            sender: RELAYED_SENDER.to_string(),
        }
    }
}
