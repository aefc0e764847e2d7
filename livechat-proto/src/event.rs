//! Server-to-client events pushed over the live connection.
//!
//! Every frame is a JSON text frame of the form
//! `{"event": "<name>", "data": <payload>}`. Only two events exist:
//! `getOnlineUsers` (broadcast to every connected party) and `newMessage`
//! (pushed to a single recipient).

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::user::UserId;

/// Event name of the presence broadcast.
pub const GET_ONLINE_USERS: &str = "getOnlineUsers";

/// Event name of a live message push.
pub const NEW_MESSAGE: &str = "newMessage";

/// Error type for event encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Events sent from the server to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full snapshot of the users that currently hold a live connection.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<UserId>),
    /// A newly persisted message addressed to the receiving client.
    #[serde(rename = "newMessage")]
    NewMessage(ChatMessage),
}

impl ServerEvent {
    /// Returns the wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => GET_ONLINE_USERS,
            Self::NewMessage(_) => NEW_MESSAGE,
        }
    }
}

/// Encodes a [`ServerEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode(event: &ServerEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a valid event.
pub fn decode(text: &str) -> Result<ServerEvent, CodecError> {
    Ok(serde_json::from_str(text)?)
}
