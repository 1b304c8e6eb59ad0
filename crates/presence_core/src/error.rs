//! Error types for registry and protocol operations.
//!
//! Every failure here is local and recoverable: callers log it and carry on.
//! Nothing in this crate panics on bad input.

use crate::types::ParticipantId;

/// Enumeration of presence errors.
///
/// Returned by [`PresenceRegistry`](crate::PresenceRegistry) operations and by
/// the protocol codec. None of these is ever sent back over the wire.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PresenceError {
    /// A join was attempted with an id that is already present
    #[error("Participant {0} is already present")]
    DuplicateParticipant(ParticipantId),

    /// The operation referenced an id that is not present
    #[error("Participant {0} is not present")]
    UnknownParticipant(ParticipantId),

    /// The payload could not be decoded or failed validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for PresenceError {
    fn from(err: serde_json::Error) -> Self {
        PresenceError::InvalidPayload(err.to_string())
    }
}
