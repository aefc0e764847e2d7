//! Connection registry: the in-memory table from user identity to the one
//! live connection that currently represents that user.
//!
//! The registry is a plain data structure with `&mut self` mutators. It has
//! no lock of its own; [`crate::presence::PresenceHub`] owns it behind a
//! mutex and is the only component that mutates it. Nothing here is
//! persisted; a restarted process starts with an empty table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use livechat_proto::UserId;
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The outbound channel of a connection was already closed.
#[derive(Debug, thiserror::Error)]
#[error("connection {0} is closed")]
pub struct ConnectionClosed(pub ConnectionId);

/// Non-owning reference to a live connection.
///
/// Wraps the sending half of the channel drained by the connection's
/// WebSocket writer task. Cloning is cheap; holding a handle never keeps
/// the socket itself open.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Wraps an existing sender under a fresh [`ConnectionId`].
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            sender,
        }
    }

    /// Creates a handle together with the receiver its writer task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Returns this connection's id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a frame for the connection's writer task.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionClosed`] if the writer task has gone away.
    pub fn send(&self, msg: Message) -> Result<(), ConnectionClosed> {
        self.sender.send(msg).map_err(|_| ConnectionClosed(self.id))
    }

    /// Returns `true` if the writer side has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug)]
struct Entry {
    handle: ConnectionHandle,
    seq: u64,
}

/// Mapping from [`UserId`] to a single [`ConnectionHandle`].
///
/// At most one entry exists per user; a second registration for the same
/// user replaces the first (last-writer-wins).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<UserId, Entry>,
    next_seq: u64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the mapping for `user_id`.
    ///
    /// Returns the handle that was replaced, if any. The replaced connection
    /// is not notified.
    pub fn register(
        &mut self,
        user_id: UserId,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(user_id, Entry { handle, seq })
            .map(|old| old.handle)
    }

    /// Removes the mapping for `user_id`, returning the handle if it existed.
    pub fn unregister(&mut self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.entries.remove(user_id).map(|e| e.handle)
    }

    /// Removes the mapping for `user_id` only if it still points at
    /// `connection`.
    ///
    /// Returns `true` if an entry was removed. A connection that was
    /// superseded by a later registration leaves its successor in place.
    pub fn unregister_connection(&mut self, user_id: &UserId, connection: ConnectionId) -> bool {
        match self.entries.get(user_id) {
            Some(entry) if entry.handle.id() == connection => {
                self.entries.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Returns the handle registered for `user_id`, without checking liveness.
    #[must_use]
    pub fn lookup(&self, user_id: &UserId) -> Option<&ConnectionHandle> {
        self.entries.get(user_id).map(|e| &e.handle)
    }

    /// Returns every registered user, oldest registration first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<(&UserId, u64)> =
            self.entries.iter().map(|(id, e)| (id, e.seq)).collect();
        users.sort_unstable_by_key(|(_, seq)| *seq);
        users.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Returns the number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no user is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
