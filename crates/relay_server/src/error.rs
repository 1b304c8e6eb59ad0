//! Error types and handling for the relay server.
//!
//! Protocol-level rejections are [`presence_core::PresenceError`] values and
//! never reach this type; `ServerError` covers the transport and lifecycle.

/// Enumeration of possible server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or handshake issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as failed background tasks
    #[error("Internal error: {0}")]
    Internal(String),

    /// One or more connections could not be closed during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}
