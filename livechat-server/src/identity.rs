//! Identity persistence seam.
//!
//! Account records live behind [`IdentityStore`]. Credential handling and
//! token issuance happen in the identity layer in front of this service;
//! this module only stores the public account record.

use std::collections::HashMap;

use async_trait::async_trait;
use livechat_proto::{Timestamp, User, UserId};
use tokio::sync::RwLock;

/// Errors reported by an identity store backend.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Another account already uses this email.
    #[error("email already exists: {0}")]
    EmailTaken(String),
    /// No account has this id.
    #[error("user not found: {0}")]
    NotFound(UserId),
    /// The backend could not complete the operation.
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub full_name: String,
    /// Login email.
    pub email: String,
}

/// Persistence boundary for user accounts.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Creates an account with a freshly issued [`UserId`].
    async fn create(&self, user: NewUser) -> Result<User, IdentityError>;

    /// Looks an account up by id.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, IdentityError>;

    /// Looks an account up by email, case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError>;

    /// Lists every account except `id`, oldest first.
    async fn list_except(&self, id: &UserId) -> Result<Vec<User>, IdentityError>;

    /// Replaces the profile image URI of an account.
    async fn update_profile_image(&self, id: &UserId, uri: String) -> Result<User, IdentityError>;
}

/// In-memory account table keyed by [`UserId`].
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create(&self, user: NewUser) -> Result<User, IdentityError> {
        let mut users = self.users.write().await;
        let email = user.email.trim().to_lowercase();
        if users.values().any(|u| u.email == email) {
            return Err(IdentityError::EmailTaken(email));
        }
        let record = User {
            id: UserId::generate(),
            full_name: user.full_name.trim().to_string(),
            email,
            profile_pic: String::new(),
            created_at: Timestamp::now(),
        };
        users.insert(record.id.clone(), record.clone());
        drop(users);
        Ok(record)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, IdentityError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_except(&self, id: &UserId) -> Result<Vec<User>, IdentityError> {
        let users = self.users.read().await;
        let mut others: Vec<User> = users.values().filter(|u| &u.id != id).cloned().collect();
        drop(users);
        others.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(others)
    }

    async fn update_profile_image(&self, id: &UserId, uri: String) -> Result<User, IdentityError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| IdentityError::NotFound(id.clone()))?;
        user.profile_pic = uri;
        Ok(user.clone())
    }
}
