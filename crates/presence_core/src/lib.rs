//! # Presence Core
//!
//! The shared state machine behind the presence relay: an in-memory registry of
//! participants and the wire protocol used to keep every client's view of that
//! registry in sync.
//!
//! ## Components
//!
//! * [`PresenceRegistry`] - authoritative table of present participants. The
//!   server owns one, and every client runs its own as a local mirror.
//! * [`ProtocolEvent`] - tagged union of the six protocol events, validated at
//!   the boundary before anything reaches the registry.
//! * [`PresenceError`] - the three recoverable failure modes of registry and
//!   codec operations.
//!
//! ## Example
//!
//! ```rust
//! use presence_core::{JoinPayload, ParticipantId, PresenceRegistry, Rotation, Vec3};
//!
//! let mut registry = PresenceRegistry::new();
//! registry.join(JoinPayload {
//!     id: ParticipantId::from("a"),
//!     username: "alice".to_string(),
//!     position: Vec3::zero(),
//!     rotation: Rotation::identity(),
//! })?;
//!
//! assert!(registry.join(JoinPayload {
//!     id: ParticipantId::from("a"),
//!     username: "mallory".to_string(),
//!     position: Vec3::new(1.0, 1.0, 1.0),
//!     rotation: Rotation::identity(),
//! }).is_err());
//! assert_eq!(registry.len(), 1);
//! # Ok::<(), presence_core::PresenceError>(())
//! ```

pub mod error;
pub mod events;
pub mod registry;
pub mod types;

pub use error::PresenceError;
pub use events::{
    EventName, JoinPayload, PartPayload, PingPayload, PositionPayload, ProtocolEvent,
    RotationPayload,
};
pub use registry::PresenceRegistry;
pub use types::{ParticipantId, ParticipantRecord, Rotation, Vec3};
