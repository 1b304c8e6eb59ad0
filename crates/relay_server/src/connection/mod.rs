//! Connection management for client connections.
//!
//! This module tracks every open WebSocket connection, the participant it
//! is bound to (if any) and the queue its outbound frames go through.

pub mod client;
pub mod manager;

pub use client::{ClientConnection, ConnectionState, OutboundMessage};
pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection IDs uniquely identify client connections throughout their
/// lifecycle on the server and decide who counts as "other" when fanning out.
pub type ConnectionId = usize;
