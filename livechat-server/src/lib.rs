//! `LiveChat` server library.
//!
//! Exposes the server for use in tests and embedding. The server tracks
//! which users hold a live WebSocket connection, broadcasts the online-user
//! set, and pushes newly persisted messages to online recipients.

pub mod api;
pub mod config;
pub mod delivery;
pub mod identity;
pub mod presence;
pub mod registry;
pub mod server;
pub mod store;
