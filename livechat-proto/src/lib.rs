//! Shared protocol definitions for the `LiveChat` wire format.

pub mod event;
pub mod message;
pub mod user;

pub use event::ServerEvent;
pub use message::{ChatMessage, MessageBody, MessageId, Timestamp, ValidationError};
pub use user::{User, UserId};
