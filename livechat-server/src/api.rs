//! HTTP request/response API: accounts, history fetch, and message send.
//!
//! The send handler is the only path that creates messages. It persists
//! through the [`MessageStore`](crate::store::MessageStore) first and only
//! then hands the stored message to the
//! [`DeliveryGateway`](crate::delivery::DeliveryGateway); the live push
//! outcome never changes the response.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use livechat_proto::{ChatMessage, MessageBody, User, UserId, ValidationError};
use serde::{Deserialize, Serialize};

use crate::identity::{IdentityError, NewUser};
use crate::server::AppState;
use crate::store::{NewMessage, StoreError};

/// Header carrying the caller's user id, set by the identity layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Errors returned by API handlers, rendered as `{"message": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed validation.
    #[error("{0}")]
    BadRequest(String),
    /// No usable caller identity.
    #[error("Unauthorized - no valid user id provided")]
    Unauthorized,
    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Request conflicts with existing state.
    #[error("{0}")]
    Conflict(String),
    /// Backend failure; detail is logged, not returned.
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "message": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::EmailTaken(_) => Self::Conflict("email already exists".to_string()),
            IdentityError::NotFound(id) => Self::NotFound(format!("user not found: {id}")),
            IdentityError::Unavailable(detail) => {
                tracing::error!(error = %detail, "identity store failure");
                Self::Internal("Internal Server Error")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "message store failure");
        Self::Internal("Internal Server Error")
    }
}

/// The caller, resolved from [`USER_ID_HEADER`] against the identity store.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let id = UserId::parse(raw).map_err(|_| ApiError::Unauthorized)?;
        match state.identities.find_by_id(&id).await? {
            Some(user) => Ok(Self(user)),
            None => {
                tracing::warn!(user_id = %id, "request from unknown user id");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// Body of `POST /api/users`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    email: String,
}

/// Body of `PUT /api/users/profile`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    profile_pic: String,
}

/// Body of `POST /api/messages/send/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    /// Always `"ok"` when the server answers.
    pub status: String,
    /// Users currently holding a live connection.
    pub online: usize,
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if req.full_name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ApiError::BadRequest("All fields are required".to_string()));
    }
    let user = state
        .identities
        .create(NewUser {
            full_name: req.full_name,
            email: req.email,
        })
        .await?;
    tracing::info!(user_id = %user.id, "account created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /api/users/profile`
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    if req.profile_pic.trim().is_empty() {
        return Err(ApiError::BadRequest("ProfilePic is required".to_string()));
    }
    let user = state
        .identities
        .update_profile_image(&me.id, req.profile_pic)
        .await?;
    Ok(Json(user))
}

/// `GET /api/messages/users`: every account except the caller.
pub async fn users_for_sidebar(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.identities.list_except(&me.id).await?))
}

/// `GET /api/messages/{id}`: history between the caller and `id`.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Path(other): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let other = UserId::parse(&other)?;
    Ok(Json(state.messages.find_between(&me.id, &other).await?))
}

/// `POST /api/messages/send/{id}`: persist, then push live if possible.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Path(receiver): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let receiver_id = UserId::parse(&receiver)?;
    let body = MessageBody::new(req.text, req.image)?;

    if state.identities.find_by_id(&receiver_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("user not found: {receiver_id}")));
    }

    let message = match state
        .messages
        .create(NewMessage {
            sender_id: me.id,
            receiver_id,
            body,
        })
        .await
    {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to persist message");
            return Err(ApiError::Internal("Failed to send message"));
        }
    };

    tracing::info!(
        message_id = %message.id,
        from = %message.sender_id,
        to = %message.receiver_id,
        "message stored"
    );

    let outcome = state.delivery.deliver(&message);
    tracing::debug!(message_id = %message.id, ?outcome, "live delivery finished");

    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        online: state.presence.online_count(),
    })
}
