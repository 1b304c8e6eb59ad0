//! Client-side mirror of the relay's presence registry.
//!
//! The adapter owns the local participant's pose and a private
//! [`PresenceRegistry`] holding everyone the relay has told it about. It
//! builds outbound events and applies inbound ones, but performs no I/O;
//! the [`transport`](crate::transport) drives it.

use presence_core::{
    JoinPayload, ParticipantId, ParticipantRecord, PingPayload, PositionPayload, PresenceError,
    PresenceRegistry, ProtocolEvent, Rotation, RotationPayload, Vec3,
};
use tracing::{debug, warn};

/// Host hooks for accepted inbound changes.
///
/// Every method defaults to doing nothing.
pub trait PresenceObserver: Send {
    /// Another participant appeared.
    fn participant_joined(&mut self, _record: &ParticipantRecord) {}

    /// A participant left or was evicted.
    fn participant_left(&mut self, _id: &ParticipantId) {}

    /// A participant moved.
    fn participant_moved(&mut self, _id: &ParticipantId, _position: Vec3) {}

    /// A participant turned.
    fn participant_rotated(&mut self, _id: &ParticipantId, _rotation: Rotation) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PresenceObserver for NoopObserver {}

/// Keeps the local mirror and builds the local participant's events.
#[derive(Debug)]
pub struct ClientPresenceAdapter<O: PresenceObserver = NoopObserver> {
    local: JoinPayload,
    mirror: PresenceRegistry,
    observer: O,
}

impl ClientPresenceAdapter<NoopObserver> {
    /// Creates an adapter for `local` with no observer.
    pub fn new(local: JoinPayload) -> Self {
        Self::with_observer(local, NoopObserver)
    }
}

impl<O: PresenceObserver> ClientPresenceAdapter<O> {
    /// Creates an adapter that forwards accepted inbound changes to `observer`.
    pub fn with_observer(local: JoinPayload, observer: O) -> Self {
        Self {
            local,
            mirror: PresenceRegistry::new(),
            observer,
        }
    }

    /// Resets the mirror for a fresh connection and returns the join to send.
    ///
    /// Whatever the previous connection learned is discarded; the relay
    /// reintroduces everyone after the join.
    pub fn on_connected(&mut self) -> ProtocolEvent {
        self.mirror.clear();
        if let Err(e) = self.mirror.join(self.local.clone()) {
            warn!("⚠️ Local participant {} not mirrored: {}", self.local.id, e);
        }
        ProtocolEvent::Join(self.local.clone())
    }

    /// Moves the local participant and returns the position event to send.
    pub fn move_to(&mut self, position: Vec3) -> ProtocolEvent {
        self.local.position = position;
        // Absent before the first connection; the join will carry the pose.
        let _ = self.mirror.update_position(&self.local.id, position);
        ProtocolEvent::Position(PositionPayload {
            id: self.local.id.clone(),
            position,
        })
    }

    /// Turns the local participant and returns the rotation event to send.
    pub fn rotate_to(&mut self, rotation: Rotation) -> ProtocolEvent {
        self.local.rotation = rotation;
        let _ = self.mirror.update_rotation(&self.local.id, rotation);
        ProtocolEvent::Rotation(RotationPayload {
            id: self.local.id.clone(),
            rotation,
        })
    }

    /// The liveness refresh for the local participant.
    pub fn ping(&self) -> ProtocolEvent {
        ProtocolEvent::Ping(PingPayload {
            id: self.local.id.clone(),
        })
    }

    /// A request for the relay to resend its roster.
    pub fn request_introduce(&self) -> ProtocolEvent {
        ProtocolEvent::Introduce
    }

    /// Applies one event received from the relay.
    ///
    /// # Returns
    ///
    /// An event to send back, if any: a departure of the local participant
    /// means the relay evicted it, and the answer is a fresh join.
    /// Otherwise the registry error for rejected events, or
    /// `InvalidPayload` for events the relay never sends (`character-ping`,
    /// `introduce`). Callers only log failures.
    pub fn apply_inbound(
        &mut self,
        event: ProtocolEvent,
    ) -> Result<Option<ProtocolEvent>, PresenceError> {
        let name = event.name();
        let result = self.apply(event);
        match &result {
            Ok(_) => debug!("✅ Applied inbound {}", name),
            Err(e) => warn!("⚠️ Ignored inbound {}: {}", name, e),
        }
        result
    }

    /// Decodes and applies one text frame received from the relay.
    pub fn apply_inbound_text(
        &mut self,
        text: &str,
    ) -> Result<Option<ProtocolEvent>, PresenceError> {
        match ProtocolEvent::decode(text) {
            Ok(event) => self.apply_inbound(event),
            Err(e) => {
                warn!("⚠️ Undecodable frame from relay: {}", e);
                Err(e)
            }
        }
    }

    fn apply(&mut self, event: ProtocolEvent) -> Result<Option<ProtocolEvent>, PresenceError> {
        match event {
            ProtocolEvent::Join(join) => {
                let record = self.mirror.join(join)?;
                self.observer.participant_joined(&record);
            }
            ProtocolEvent::Part(part) if part.id == self.local.id => {
                warn!("⏰ Relay evicted {}; joining again", part.id);
                self.mirror.part(&part.id)?;
                self.mirror.join(self.local.clone())?;
                return Ok(Some(ProtocolEvent::Join(self.local.clone())));
            }
            ProtocolEvent::Part(part) => {
                self.mirror.part(&part.id)?;
                self.observer.participant_left(&part.id);
            }
            ProtocolEvent::Position(update) => {
                self.mirror.update_position(&update.id, update.position)?;
                self.observer.participant_moved(&update.id, update.position);
            }
            ProtocolEvent::Rotation(update) => {
                self.mirror.update_rotation(&update.id, update.rotation)?;
                self.observer.participant_rotated(&update.id, update.rotation);
            }
            other @ (ProtocolEvent::Ping(_) | ProtocolEvent::Introduce) => {
                return Err(PresenceError::InvalidPayload(format!(
                    "{} is not sent by the relay",
                    other.name()
                )));
            }
        }
        Ok(None)
    }

    /// Everyone currently mirrored, local participant included once connected.
    pub fn participants(&self) -> Vec<ParticipantRecord> {
        self.mirror.list()
    }

    /// The local participant's identity and current pose.
    pub fn local(&self) -> &JoinPayload {
        &self.local
    }

    /// The host observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// The host observer, mutably.
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }
}
