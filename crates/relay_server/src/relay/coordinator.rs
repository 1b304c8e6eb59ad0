//! Per-connection protocol handling and fan-out.
//!
//! The coordinator is the only component that mutates the shared registry
//! on behalf of clients. Each inbound frame is decoded, applied under the
//! registry lock and, on success, re-encoded and queued to every other
//! connection before the lock is released.

use crate::config::ServerConfig;
use crate::connection::{ConnectionId, ConnectionManager, ConnectionState, OutboundMessage};
use crate::health::{DepartureSink, LivenessConfig, LivenessMonitor};
use presence_core::{
    EventName, JoinPayload, ParticipantId, ParticipantRecord, PresenceError, PresenceRegistry,
    ProtocolEvent,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// The registry every server component shares.
///
/// One mutex is the single mutual-exclusion domain for all registry access.
pub type SharedRegistry = Arc<Mutex<PresenceRegistry>>;

/// Longest slice of a rejected frame that is echoed into the logs.
const LOGGED_FRAME_CHARS: usize = 256;

/// What handling one inbound event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A participant joined and was bound to the sending connection
    Joined {
        /// The new participant
        id: ParticipantId,
        /// Connections the join was queued for
        recipients: usize,
        /// Roster entries sent back to the joiner, `None` when throttled
        introduced: Option<usize>,
        /// Participant this connection was bound to before, now parted
        replaced: Option<ParticipantId>,
    },
    /// A pose update was applied and fanned out
    Relayed {
        /// Which event was relayed
        event: EventName,
        /// The participant it was about
        id: ParticipantId,
        /// Connections the update was queued for
        recipients: usize,
    },
    /// A liveness refresh was recorded
    Pinged(ParticipantId),
    /// The roster was resent to the requester
    Introduced {
        /// Roster entries sent
        sent: usize,
    },
    /// The sending connection closed before the event could take effect
    Discarded,
}

/// Applies client events to the shared registry and relays the results.
#[derive(Debug)]
pub struct RelayCoordinator {
    registry: SharedRegistry,
    connections: Arc<ConnectionManager>,
    max_message_size: usize,
}

impl RelayCoordinator {
    /// Creates a coordinator with a fresh, empty registry.
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_registry(Arc::new(Mutex::new(PresenceRegistry::new())), config)
    }

    /// Creates a coordinator around an existing registry.
    pub fn with_registry(registry: SharedRegistry, config: &ServerConfig) -> Self {
        Self {
            registry,
            connections: Arc::new(ConnectionManager::new(config.introduce_throttle())),
            max_message_size: config.max_message_size,
        }
    }

    /// The shared registry.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// The connection manager.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Builds a liveness monitor that announces evictions through this
    /// coordinator.
    pub fn liveness_monitor(self: &Arc<Self>, config: LivenessConfig) -> LivenessMonitor {
        LivenessMonitor::new(self.registry.clone(), self.clone(), config)
    }

    /// Registers a new connection in the `Connected` state.
    ///
    /// The registry is not touched until the connection sends a join.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - Peer address, for logging
    /// * `outbound` - Sender half of the connection's outbound queue
    pub fn on_connect(
        &self,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> ConnectionId {
        self.connections.add_connection(remote_addr, outbound)
    }

    /// Handles one inbound text frame.
    ///
    /// Rejections are logged here and returned; nothing is sent back to the
    /// client for them.
    pub async fn handle_message(
        &self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Result<Dispatch, PresenceError> {
        let result = match self.decode(text) {
            Ok(event) => self.handle_event(connection_id, event).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            let excerpt: String = text.chars().take(LOGGED_FRAME_CHARS).collect();
            warn!(
                "⚠️ Rejected frame from connection {}: {} (payload: {})",
                connection_id, e, excerpt
            );
        }
        result
    }

    fn decode(&self, text: &str) -> Result<ProtocolEvent, PresenceError> {
        if text.len() > self.max_message_size {
            return Err(PresenceError::InvalidPayload(format!(
                "frame of {} bytes exceeds the {} byte limit",
                text.len(),
                self.max_message_size
            )));
        }
        ProtocolEvent::decode(text)
    }

    /// Applies an already decoded event on behalf of a connection.
    pub async fn handle_event(
        &self,
        connection_id: ConnectionId,
        event: ProtocolEvent,
    ) -> Result<Dispatch, PresenceError> {
        event.validate()?;
        match event {
            ProtocolEvent::Join(join) => self.handle_join(connection_id, join).await,
            ProtocolEvent::Position(update) => {
                let mut registry = self.registry.lock().await;
                registry.update_position(&update.id, update.position)?;
                debug!("📍 character position {} -> {:?}", update.id, update.position);
                let id = update.id.clone();
                let recipients = self.relay(connection_id, &ProtocolEvent::Position(update))?;
                drop(registry);
                Ok(Dispatch::Relayed {
                    event: EventName::Position,
                    id,
                    recipients,
                })
            }
            ProtocolEvent::Rotation(update) => {
                let mut registry = self.registry.lock().await;
                registry.update_rotation(&update.id, update.rotation)?;
                debug!("🧭 character rotation {} -> {:?}", update.id, update.rotation);
                let id = update.id.clone();
                let recipients = self.relay(connection_id, &ProtocolEvent::Rotation(update))?;
                drop(registry);
                Ok(Dispatch::Relayed {
                    event: EventName::Rotation,
                    id,
                    recipients,
                })
            }
            ProtocolEvent::Ping(ping) => {
                self.registry.lock().await.record_ping(&ping.id)?;
                debug!("💓 character ping {}", ping.id);
                Ok(Dispatch::Pinged(ping.id))
            }
            ProtocolEvent::Introduce => {
                let registry = self.registry.lock().await;
                let exclude = self.connections.participant_of(connection_id);
                let sent = self.send_roster(connection_id, &registry.list(), exclude.as_ref())?;
                drop(registry);
                debug!("📇 introduce for connection {}: {} entries", connection_id, sent);
                Ok(Dispatch::Introduced { sent })
            }
            ProtocolEvent::Part(part) => Err(PresenceError::InvalidPayload(format!(
                "{} for {} is not accepted from clients",
                EventName::Part,
                part.id
            ))),
        }
    }

    async fn handle_join(
        &self,
        connection_id: ConnectionId,
        join: JoinPayload,
    ) -> Result<Dispatch, PresenceError> {
        let mut registry = self.registry.lock().await;
        let record = registry.join(join)?;

        let previous = match self
            .connections
            .bind_participant(connection_id, record.id.clone())
        {
            Some(previous) => previous,
            None => {
                // The connection is gone; keep the registry consistent with it.
                let _ = registry.part(&record.id);
                return Ok(Dispatch::Discarded);
            }
        };
        info!(
            "👋 character join {} ({}) on connection {}",
            record.id, record.username, connection_id
        );

        let mut replaced = None;
        if let ConnectionState::Identified(old) = previous {
            if old != record.id && registry.part(&old).is_ok() {
                info!("🔁 Connection {} switched from {} to {}", connection_id, old, record.id);
                self.relay(connection_id, &ProtocolEvent::part(old.clone()))?;
                replaced = Some(old);
            }
        }

        let recipients = self.relay(
            connection_id,
            &ProtocolEvent::Join(JoinPayload::from(&record)),
        )?;

        let introduced = if self.connections.try_introduce(connection_id, Instant::now()) {
            Some(self.send_roster(connection_id, &registry.list(), Some(&record.id))?)
        } else {
            debug!("⏳ Introduce for connection {} throttled", connection_id);
            None
        };
        drop(registry);

        Ok(Dispatch::Joined {
            id: record.id,
            recipients,
            introduced,
            replaced,
        })
    }

    /// Queues `event` to every connection other than `sender`.
    fn relay(&self, sender: ConnectionId, event: &ProtocolEvent) -> Result<usize, PresenceError> {
        let text = event.encode()?;
        Ok(self.connections.broadcast_to_others(sender, &text))
    }

    /// Sends each roster entry except `exclude` to one connection as a join.
    fn send_roster(
        &self,
        connection_id: ConnectionId,
        roster: &[ParticipantRecord],
        exclude: Option<&ParticipantId>,
    ) -> Result<usize, PresenceError> {
        let mut sent = 0;
        for record in roster.iter().filter(|r| Some(&r.id) != exclude) {
            let text = ProtocolEvent::Join(JoinPayload::from(record)).encode()?;
            if self
                .connections
                .send_to_connection(connection_id, OutboundMessage::Text(text))
            {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Tears down a connection.
    ///
    /// If the connection was identified and its participant is still
    /// present, the participant is parted and its departure is broadcast to
    /// every remaining connection.
    ///
    /// # Returns
    ///
    /// The participant that departed, if any.
    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> Option<ParticipantId> {
        let mut registry = self.registry.lock().await;
        let connection = self.connections.remove_connection(connection_id)?;
        let id = connection.participant()?.clone();

        match registry.part(&id) {
            Ok(record) => {
                info!("👋 character part {} ({})", record.id, record.username);
                match ProtocolEvent::part(id.clone()).encode() {
                    Ok(text) => {
                        self.connections.broadcast_to_all(&text);
                    }
                    Err(e) => error!("Failed to encode departure of {}: {}", id, e),
                }
                Some(id)
            }
            Err(e) => {
                debug!("Connection {} closed after {} already left: {}", connection_id, id, e);
                None
            }
        }
    }

    /// Asks every open connection to close.
    ///
    /// # Returns
    ///
    /// The number of connections a close request was queued for.
    pub fn close_all(&self, reason: &str) -> usize {
        let requested = self.connections.close_all(reason);
        info!("🔌 Requested close on {} connections: {}", requested, reason);
        requested
    }

    /// Number of participants currently present.
    pub async fn participant_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}

impl DepartureSink for RelayCoordinator {
    /// Unbinds the evicted participant from its connection, if still open,
    /// and announces the departure to every connection. The owner hears it
    /// too, so its client knows to join again.
    fn participant_expired(&self, record: &ParticipantRecord) {
        if let Some(owner) = self.connections.unbind_participant(&record.id) {
            debug!("Connection {} no longer bound to {}", owner, record.id);
        }
        let text = match ProtocolEvent::part(record.id.clone()).encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode departure of {}: {}", record.id, e);
                return;
            }
        };
        let recipients = self.connections.broadcast_to_all(&text);
        debug!(
            "📡 Departure of {} announced to {} connections",
            record.id, recipients
        );
    }
}
