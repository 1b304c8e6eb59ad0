//! Connection manager for tracking and managing client connections.
//!
//! This module provides the central registry of open connections, handling
//! connection lifecycle, participant binding and outbound fan-out.

use super::{
    client::{ClientConnection, ConnectionState, OutboundMessage},
    ConnectionId,
};
use dashmap::DashMap;
use presence_core::ParticipantId;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Central manager for all client connections.
///
/// # Architecture
///
/// * Uses `DashMap` for lock-free-per-shard connection storage
/// * Implements atomic connection ID generation
/// * Delivers frames through each connection's unbounded outbound queue, so
///   every send is non-blocking and safe to perform under the registry lock
///
/// No method holds a map guard across a call back into the map.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: DashMap<ConnectionId, ClientConnection>,

    /// Atomic counter for generating unique connection IDs
    next_id: AtomicUsize,

    /// Throttle window handed to every new connection
    introduce_window: Duration,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    ///
    /// # Arguments
    ///
    /// * `introduce_window` - Throttle window for join-triggered introductions
    pub fn new(introduce_window: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicUsize::new(1),
            introduce_window,
        }
    }

    /// Adds a new connection and returns its unique ID.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    /// * `outbound` - Sender half of the connection's outbound queue
    ///
    /// # Returns
    ///
    /// A unique `ConnectionId` assigned to this connection.
    pub fn add_connection(
        &self,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection::new(remote_addr, outbound, self.introduce_window);
        self.connections.insert(connection_id, connection);
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        connection_id
    }

    /// Removes a connection from the manager.
    ///
    /// # Returns
    ///
    /// The removed connection, or `None` if it was already gone.
    pub fn remove_connection(&self, connection_id: ConnectionId) -> Option<ClientConnection> {
        let removed = self.connections.remove(&connection_id).map(|(_, c)| c);
        if let Some(connection) = &removed {
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id, connection.remote_addr
            );
        }
        removed
    }

    /// Current lifecycle state of a connection.
    pub fn state(&self, connection_id: ConnectionId) -> Option<ConnectionState> {
        self.connections
            .get(&connection_id)
            .map(|c| c.state.clone())
    }

    /// The participant a connection is bound to.
    pub fn participant_of(&self, connection_id: ConnectionId) -> Option<ParticipantId> {
        self.connections
            .get(&connection_id)
            .and_then(|c| c.participant().cloned())
    }

    /// Finds the connection currently bound to a participant.
    pub fn connection_of(&self, participant: &ParticipantId) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|entry| entry.participant() == Some(participant))
            .map(|entry| *entry.key())
    }

    /// Binds a connection to a participant.
    ///
    /// # Returns
    ///
    /// The state the connection had before binding, or `None` if the
    /// connection no longer exists (nothing is bound in that case).
    pub fn bind_participant(
        &self,
        connection_id: ConnectionId,
        participant: ParticipantId,
    ) -> Option<ConnectionState> {
        let mut connection = self.connections.get_mut(&connection_id)?;
        let previous = std::mem::replace(
            &mut connection.state,
            ConnectionState::Identified(participant),
        );
        Some(previous)
    }

    /// Returns whichever connection is bound to `participant` to the
    /// `Connected` state.
    ///
    /// # Returns
    ///
    /// The connection that was unbound, if there was one.
    pub fn unbind_participant(&self, participant: &ParticipantId) -> Option<ConnectionId> {
        let connection_id = self.connection_of(participant)?;
        let mut connection = self.connections.get_mut(&connection_id)?;
        if connection.participant() == Some(participant) {
            connection.state = ConnectionState::Connected;
            Some(connection_id)
        } else {
            None
        }
    }

    /// Asks a connection's introduce throttle whether a join-triggered
    /// introduction may go out at `now`.
    pub fn try_introduce(&self, connection_id: ConnectionId, now: Instant) -> bool {
        self.connections
            .get_mut(&connection_id)
            .map(|mut c| c.introduce.try_acquire(now))
            .unwrap_or(false)
    }

    /// Sends a frame to a specific connection.
    ///
    /// # Returns
    ///
    /// `true` if the frame was queued.
    pub fn send_to_connection(&self, connection_id: ConnectionId, message: OutboundMessage) -> bool {
        match self.connections.get(&connection_id) {
            Some(connection) => {
                let queued = connection.send(message);
                if !queued {
                    warn!("Outbound queue for connection {} is closed", connection_id);
                }
                queued
            }
            None => false,
        }
    }

    /// Broadcasts a text frame to every connection except `sender`.
    ///
    /// # Returns
    ///
    /// The number of connections the frame was queued for.
    pub fn broadcast_to_others(&self, sender: ConnectionId, text: &str) -> usize {
        self.fan_out(Some(sender), text)
    }

    /// Broadcasts a text frame to every connection.
    ///
    /// # Returns
    ///
    /// The number of connections the frame was queued for.
    pub fn broadcast_to_all(&self, text: &str) -> usize {
        self.fan_out(None, text)
    }

    fn fan_out(&self, except: Option<ConnectionId>, text: &str) -> usize {
        let mut delivered = 0;
        for entry in self.connections.iter() {
            if Some(*entry.key()) == except {
                continue;
            }
            if entry.send(OutboundMessage::Text(text.to_string())) {
                delivered += 1;
            } else {
                warn!("Outbound queue for connection {} is closed", entry.key());
            }
        }
        debug!("📡 Broadcasted frame to {} connections", delivered);
        delivered
    }

    /// Requests a close frame on every connection.
    ///
    /// # Returns
    ///
    /// The number of connections the close request was queued for.
    pub fn close_all(&self, reason: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.send(OutboundMessage::Close(reason.to_string())))
            .count()
    }

    /// Ids of every open connection.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}
