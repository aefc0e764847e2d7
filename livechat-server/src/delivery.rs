//! Delivery gateway: pushes a freshly persisted message to its recipient's
//! live connection, if the recipient is online.
//!
//! Delivery is best-effort and at-most-once. An offline recipient is the
//! normal path, not an error; the message stays available through history
//! fetch. Send failures are logged and swallowed so the outcome never
//! reaches the caller that persisted the message.

use std::sync::Arc;

use axum::extract::ws::Message;
use livechat_proto::event::{self, ServerEvent};
use livechat_proto::ChatMessage;

use crate::presence::PresenceHub;

/// What happened to a single [`DeliveryGateway::deliver`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A `newMessage` frame was queued on the recipient's connection.
    Pushed,
    /// The recipient holds no registered connection.
    RecipientOffline,
    /// The recipient was registered but the push could not be queued.
    Failed,
}

/// Fans out persisted messages to online recipients.
#[derive(Debug, Clone)]
pub struct DeliveryGateway {
    presence: Arc<PresenceHub>,
}

impl DeliveryGateway {
    /// Creates a gateway that looks recipients up in `presence`.
    #[must_use]
    pub const fn new(presence: Arc<PresenceHub>) -> Self {
        Self { presence }
    }

    /// Pushes `message` to its receiver if online.
    ///
    /// Must only be called after the message store confirmed the write.
    pub fn deliver(&self, message: &ChatMessage) -> DeliveryOutcome {
        let Some(handle) = self.presence.lookup(&message.receiver_id) else {
            tracing::debug!(
                message_id = %message.id,
                receiver = %message.receiver_id,
                "receiver offline, skipping live push"
            );
            return DeliveryOutcome::RecipientOffline;
        };

        let frame = match event::encode(&ServerEvent::NewMessage(message.clone())) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(message_id = %message.id, error = %e, "failed to encode newMessage");
                return DeliveryOutcome::Failed;
            }
        };

        match handle.send(Message::Text(frame.into())) {
            Ok(()) => {
                tracing::debug!(
                    message_id = %message.id,
                    receiver = %message.receiver_id,
                    connection = %handle.id(),
                    "message pushed"
                );
                DeliveryOutcome::Pushed
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    receiver = %message.receiver_id,
                    error = %e,
                    "live push failed"
                );
                DeliveryOutcome::Failed
            }
        }
    }
}
