//! User identity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Timestamp, ValidationError};

/// Stable account identifier issued by the identity store.
///
/// Also the key of the presence registry and the value carried in the
/// `userId` query parameter of the live-connection handshake.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an already-issued identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Issues a fresh identifier (UUID v7, hyphenated).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Parses an identifier supplied by a client.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyUserId`] if `raw` is empty or only
    /// whitespace.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public view of an account. Credentials never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Account identifier.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Login email, unique per account.
    pub email: String,
    /// Profile image URI; empty until one is set.
    #[serde(default)]
    pub profile_pic: String,
    /// When the account was created.
    pub created_at: Timestamp,
}
