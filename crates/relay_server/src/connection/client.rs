//! Client connection representation.
//!
//! This module defines the per-connection record kept by the
//! [`ConnectionManager`](super::ConnectionManager).

use crate::relay::IntroduceThrottle;
use presence_core::ParticipantId;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

/// Where a connection is in its lifecycle.
///
/// A connection that has been removed from the manager is closed; there is
/// no explicit variant for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open, no accepted `character-join` yet
    Connected,
    /// Bound to the participant from its last accepted `character-join`
    Identified(ParticipantId),
}

impl ConnectionState {
    /// The bound participant, if any.
    pub fn participant(&self) -> Option<&ParticipantId> {
        match self {
            ConnectionState::Connected => None,
            ConnectionState::Identified(id) => Some(id),
        }
    }
}

/// A frame queued for delivery to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// A JSON text frame
    Text(String),
    /// Ask the writer to send a close frame with this reason and stop
    Close(String),
}

/// Represents an individual client connection to the server.
///
/// # Fields
///
/// * `state` - Lifecycle state, carries the bound participant id
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was established
/// * `outbound` - Queue drained by the connection's writer task
/// * `introduce` - Throttle for join-triggered roster introductions
#[derive(Debug)]
pub struct ClientConnection {
    /// Lifecycle state of this connection
    pub state: ConnectionState,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,

    /// Outbound frame queue
    pub outbound: mpsc::UnboundedSender<OutboundMessage>,

    /// Per-connection introduce throttle
    pub introduce: IntroduceThrottle,
}

impl ClientConnection {
    /// Creates a new client connection in the `Connected` state.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    /// * `outbound` - Sender half of the connection's outbound queue
    /// * `introduce_window` - Throttle window for join-triggered introductions
    pub fn new(
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        introduce_window: Duration,
    ) -> Self {
        Self {
            state: ConnectionState::Connected,
            remote_addr,
            connected_at: SystemTime::now(),
            outbound,
            introduce: IntroduceThrottle::new(introduce_window),
        }
    }

    /// The participant this connection is bound to, if any.
    pub fn participant(&self) -> Option<&ParticipantId> {
        self.state.participant()
    }

    /// Queues a frame for this connection.
    ///
    /// Returns false if the writer side has already gone away.
    pub fn send(&self, message: OutboundMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}
