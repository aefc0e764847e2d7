//! Chat message types shared by the HTTP API and the live push channel.
//!
//! A [`ChatMessage`] is what the message store hands back after a successful
//! write and what the `newMessage` event carries to an online recipient.
//! The body invariant (at least one of text or image) is enforced by
//! [`MessageBody`], both on construction and on deserialization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

/// Errors raised when wire input violates a message or identity invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Neither text nor image was supplied.
    #[error("Message cannot be empty")]
    EmptyMessage,
    /// A user id was empty.
    #[error("user id must not be empty")]
    EmptyUserId,
}

/// Unique identifier for a stored message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Unvalidated text/image pair as it appears on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessageBody {
    /// Message text, if any.
    #[serde(default)]
    pub text: Option<String>,
    /// Image URI, if any.
    #[serde(default)]
    pub image: Option<String>,
}

/// Message content: optional text and optional image URI, never both absent.
///
/// Empty strings are normalized to absent, so `text` is non-empty whenever
/// it is `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessageBody")]
pub struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

impl MessageBody {
    /// Builds a body from optional text and image.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyMessage`] if both are absent or empty.
    pub fn new(text: Option<String>, image: Option<String>) -> Result<Self, ValidationError> {
        let text = text.filter(|t| !t.is_empty());
        let image = image.filter(|i| !i.is_empty());
        if text.is_none() && image.is_none() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(Self { text, image })
    }

    /// Convenience constructor for a text-only body.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyMessage`] if `text` is empty.
    pub fn from_text(text: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(Some(text.into()), None)
    }

    /// Returns the message text, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns the image URI, if any.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

impl TryFrom<RawMessageBody> for MessageBody {
    type Error = ValidationError;

    fn try_from(raw: RawMessageBody) -> Result<Self, Self::Error> {
        Self::new(raw.text, raw.image)
    }
}

/// A persisted chat message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Who sent the message.
    pub sender_id: UserId,
    /// Who the message is addressed to.
    pub receiver_id: UserId,
    /// Text and/or image content.
    #[serde(flatten)]
    pub body: MessageBody,
    /// When the store accepted the message.
    pub created_at: Timestamp,
}

impl ChatMessage {
    /// Returns `true` if the message was exchanged between `a` and `b`, in
    /// either direction.
    #[must_use]
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.sender_id == a && &self.receiver_id == b)
            || (&self.sender_id == b && &self.receiver_id == a)
    }
}
