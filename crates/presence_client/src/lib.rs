//! # Presence Client
//!
//! Client side of the presence relay protocol.
//!
//! * [`adapter`] - local mirror of the relay's registry plus the local
//!   participant's outbound events; no I/O
//! * [`lifecycle`] - reconnection state machine with a capped, jittered
//!   exponential backoff
//! * [`transport`] - the WebSocket task tying both together, controlled
//!   through a [`ClientHandle`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use presence_client::{ClientConfig, ClientPresenceAdapter, PresenceClient};
//! use presence_core::{JoinPayload, ParticipantId, Rotation, Vec3};
//!
//! # async fn demo() -> Result<(), presence_client::ClientError> {
//! let adapter = ClientPresenceAdapter::new(JoinPayload {
//!     id: ParticipantId::from("alice"),
//!     username: "Alice".to_string(),
//!     position: Vec3::zero(),
//!     rotation: Rotation::identity(),
//! });
//! let (client, handle) = PresenceClient::new(ClientConfig::default(), adapter);
//! let running = tokio::spawn(client.run());
//!
//! handle.move_to(Vec3::new(1.0, 0.0, 0.0));
//! handle.close();
//! # let _ = running.await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod lifecycle;
pub mod transport;

pub use adapter::{ClientPresenceAdapter, NoopObserver, PresenceObserver};
pub use error::ClientError;
pub use lifecycle::{
    ConnectOutcome, ConnectionLifecycle, LinkSnapshot, LinkStatus, ReconnectPolicy, RetryDecision,
};
pub use transport::{ClientConfig, ClientHandle, PresenceClient};
