//! Presence protocol: the connect/disconnect lifecycle that populates the
//! [`ConnectionRegistry`] and broadcasts the online-user set.
//!
//! Each live connection is represented by a [`Session`] that moves through
//! `Connecting -> Online -> Offline`. A connection whose handshake carries no
//! user id stays `Anonymous`: it receives presence broadcasts but is never
//! addressable for direct pushes.
//!
//! All registry mutation and the broadcast that follows it happen inside one
//! critical section on a synchronous mutex that is never held across an
//! `.await`, so every broadcast reflects a consistent snapshot.

use std::collections::HashMap;

use axum::extract::ws::Message;
use livechat_proto::event::{self, ServerEvent};
use livechat_proto::UserId;
use parking_lot::Mutex;

use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

/// Lifecycle state of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is up, handshake not yet processed.
    Connecting,
    /// Registered under a user id.
    Online,
    /// Handshake carried no user id; broadcast-only.
    Anonymous,
    /// Disconnected. Terminal.
    Offline,
}

/// Per-connection presence state held by the socket task.
#[derive(Debug)]
pub struct Session {
    connection: ConnectionId,
    user_id: Option<UserId>,
    state: ConnectionState,
}

impl Session {
    /// Returns the connection this session belongs to.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Returns the user id recorded at connect time, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }
}

#[derive(Debug, Default)]
struct Inner {
    registry: ConnectionRegistry,
    /// Every connected party, identified or not. Broadcast targets.
    parties: HashMap<ConnectionId, ConnectionHandle>,
}

/// Process-wide presence state: the user registry plus the set of all
/// connected parties.
///
/// Created once at startup and shared through [`crate::server::AppState`].
#[derive(Debug, Default)]
pub struct PresenceHub {
    inner: Mutex<Inner>,
}

impl PresenceHub {
    /// Creates a hub with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new connection.
    ///
    /// With a user id the connection is registered (replacing any earlier
    /// connection for that user) and goes `Online`; without one it stays
    /// `Anonymous`. Either way the current snapshot is broadcast to every
    /// connected party, the new one included.
    pub fn connect(&self, handle: ConnectionHandle, user_id: Option<UserId>) -> Session {
        let connection = handle.id();
        let mut session = Session {
            connection,
            user_id,
            state: ConnectionState::Connecting,
        };

        let mut inner = self.inner.lock();
        inner.parties.insert(connection, handle.clone());

        if let Some(user_id) = &session.user_id {
            if let Some(replaced) = inner.registry.register(user_id.clone(), handle) {
                tracing::info!(
                    user_id = %user_id,
                    old = %replaced.id(),
                    new = %connection,
                    "replaced existing connection (duplicate registration)"
                );
            }
            session.state = ConnectionState::Online;
            tracing::info!(user_id = %user_id, connection = %connection, "user online");
        } else {
            session.state = ConnectionState::Anonymous;
            tracing::warn!(connection = %connection, "connection without user id, treating as anonymous");
        }

        broadcast_online_users(&inner);
        drop(inner);
        session
    }

    /// Tears down a connection's presence.
    ///
    /// Removes the party, unregisters its user id if the registry still maps
    /// that user to this connection, and re-broadcasts the snapshot for
    /// identified connections. Returns `true` if a broadcast was sent.
    /// Calling it again on an `Offline` session does nothing.
    pub fn disconnect(&self, session: &mut Session) -> bool {
        if session.state == ConnectionState::Offline {
            return false;
        }
        let previous = session.state;
        session.state = ConnectionState::Offline;

        let mut inner = self.inner.lock();
        inner.parties.remove(&session.connection);

        let Some(user_id) = &session.user_id else {
            tracing::debug!(connection = %session.connection, ?previous, "anonymous connection closed");
            return false;
        };

        if inner
            .registry
            .unregister_connection(user_id, session.connection)
        {
            tracing::info!(user_id = %user_id, connection = %session.connection, "user offline");
        } else {
            tracing::info!(
                user_id = %user_id,
                connection = %session.connection,
                "superseded connection closed, registry entry kept"
            );
        }

        broadcast_online_users(&inner);
        drop(inner);
        true
    }

    /// Returns the handle currently registered for `user_id`.
    #[must_use]
    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.inner.lock().registry.lookup(user_id).cloned()
    }

    /// Returns the users currently online, oldest registration first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserId> {
        self.inner.lock().registry.snapshot()
    }

    /// Returns the number of users currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    /// Returns the number of connected parties, anonymous ones included.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.lock().parties.len()
    }

    /// Sends a Close frame to every connected party.
    ///
    /// Each writer task forwards the frame and exits, which runs the normal
    /// disconnect path for that connection.
    pub fn close_all(&self) {
        let inner = self.inner.lock();
        for (connection, handle) in &inner.parties {
            tracing::info!(connection = %connection, "sending close frame");
            let _ = handle.send(Message::Close(None));
        }
    }
}

/// Sends the current snapshot to every party. Caller holds the lock.
fn broadcast_online_users(inner: &Inner) {
    let snapshot = inner.registry.snapshot();
    let frame = match event::encode(&ServerEvent::OnlineUsers(snapshot)) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode presence broadcast");
            return;
        }
    };

    tracing::debug!(
        parties = inner.parties.len(),
        online = inner.registry.len(),
        "broadcasting online users"
    );
    for handle in inner.parties.values() {
        if handle.send(Message::Text(frame.clone().into())).is_err() {
            // The party's own disconnect path removes it.
            tracing::debug!(connection = %handle.id(), "presence broadcast to closed connection dropped");
        }
    }
}
