//! Server core: shared state, WebSocket handler, and router assembly.
//!
//! The server accepts live connections on `/ws?userId=<id>`, hands them to
//! the [`PresenceHub`], and serves the JSON API under `/api`. Message sends
//! persist through the [`MessageStore`] and are then pushed to the
//! recipient by the [`DeliveryGateway`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use futures_util::{SinkExt, StreamExt};
use livechat_proto::UserId;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::ServerConfig;
use crate::delivery::DeliveryGateway;
use crate::identity::{IdentityStore, InMemoryIdentityStore};
use crate::presence::PresenceHub;
use crate::registry::ConnectionHandle;
use crate::store::{InMemoryMessageStore, MessageStore};

/// Default request body limit (50 MB).
const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Shared server state injected into every handler.
pub struct AppState {
    /// Presence registry and connected parties.
    pub presence: Arc<PresenceHub>,
    /// Live push path for new messages.
    pub delivery: DeliveryGateway,
    /// Durable message history.
    pub messages: Arc<dyn MessageStore>,
    /// Account records.
    pub identities: Arc<dyn IdentityStore>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl AppState {
    /// Creates state over the given stores with an empty presence registry.
    #[must_use]
    pub fn new(messages: Arc<dyn MessageStore>, identities: Arc<dyn IdentityStore>) -> Self {
        let presence = Arc::new(PresenceHub::new());
        Self {
            delivery: DeliveryGateway::new(Arc::clone(&presence)),
            presence,
            messages,
            identities,
        }
    }

    /// Creates state backed by in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(InMemoryIdentityStore::new()),
        )
    }
}

/// HTTP-level options applied when building the router.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Browser origin allowed by CORS; `None` disables the CORS layer.
    pub allowed_origin: Option<String>,
    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            allowed_origin: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl From<&ServerConfig> for HttpOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            allowed_origin: Some(config.allowed_origin.clone()).filter(|o| !o.is_empty()),
            max_body_size: config.max_body_size,
        }
    }
}

/// Handshake metadata supplied as query parameters on `/ws`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default)]
    user_id: Option<String>,
}

impl Handshake {
    /// Extracts the user id, or `None` for an anonymous connection.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
            .as_deref()
            .and_then(|raw| UserId::parse(raw).ok())
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Create the outbound channel and admit the connection to the
///    [`PresenceHub`] (registers the user id if any, broadcasts presence).
/// 2. Spawn a writer task draining the channel into the socket.
/// 3. Spawn a reader task that waits for Close; inbound data frames are
///    ignored.
/// 4. When either task ends, abort the other and run the disconnect path.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Option<UserId>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (handle, mut rx) = ConnectionHandle::channel();
    let connection = handle.id();
    let mut session = state.presence.connect(handle, user_id);

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection = %connection, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => {
                    tracing::debug!(connection = %connection, "received close frame");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => {
                    tracing::trace!(connection = %connection, "ignoring inbound client frame");
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.presence.disconnect(&mut session);
    tracing::info!(connection = %connection, "connection closed");
}

/// axum handler that upgrades an HTTP request to a live connection.
///
/// A handshake query that fails to deserialize is not fatal: the client is
/// admitted as an anonymous connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    handshake: Result<Query<Handshake>, QueryRejection>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user_id = match handshake {
        Ok(Query(handshake)) => handshake.user_id(),
        Err(rejection) => {
            tracing::warn!(error = %rejection, "malformed handshake query, admitting as anonymous");
            None
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Builds the full application router.
pub fn router(state: Arc<AppState>, options: &HttpOptions) -> axum::Router {
    let mut app = axum::Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(api::health))
        .route("/api/users", post(api::create_user))
        .route("/api/users/profile", put(api::update_profile))
        .route("/api/messages/users", get(api::users_for_sidebar))
        .route("/api/messages/{id}", get(api::get_messages))
        .route("/api/messages/send/{id}", post(api::send_message))
        .layer(DefaultBodyLimit::max(options.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(origin) = &options.allowed_origin {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers([
                            header::CONTENT_TYPE,
                            header::AUTHORIZATION,
                            HeaderName::from_static(api::USER_ID_HEADER),
                        ])
                        .allow_credentials(true),
                );
            }
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "invalid CORS origin, CORS disabled");
            }
        }
    }

    app
}

/// Sends Close to every live connection and waits up to `grace` for their
/// disconnect paths to finish.
///
/// Returns `true` if every connection drained before the deadline.
pub async fn shutdown(state: &AppState, grace: Duration) -> bool {
    state.presence.close_all();
    let drained = tokio::time::timeout(grace, async {
        while state.presence.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok();
    if !drained {
        tracing::warn!(
            remaining = state.presence.connection_count(),
            "connections still open after shutdown grace period"
        );
    }
    drained
}

/// Starts the server on the given address with in-memory stores and
/// default HTTP options, returning the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(AppState::in_memory()), &HttpOptions::default()).await
}

/// Starts the server with a pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
    options: &HttpOptions,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state, options);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
