//! Error types for the presence client.

use presence_core::PresenceError;

/// Errors surfaced by the client transport.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The WebSocket could not be opened or failed mid-session
    #[error("Transport error: {0}")]
    Transport(String),

    /// The reconnection cap was reached; the client will not try again
    #[error("Gave up after {attempts} failed connection attempts")]
    GaveUp {
        /// Consecutive failed attempts when the client gave up
        attempts: u32,
    },

    /// An event could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] PresenceError),
}
