//! Protocol events exchanged between the relay and its clients.
//!
//! Every event travels as one JSON text frame of the form
//! `{"event": "<name>", "data": <payload>}`:
//!
//! ```json
//! {
//!   "event": "character-position",
//!   "data": { "id": "a", "position": { "x": 2.0, "y": 0.0, "z": 0.0 } }
//! }
//! ```
//!
//! `introduce` carries no `data`. Decoding always validates the payload, so a
//! [`ProtocolEvent`] that made it past [`ProtocolEvent::decode`] has a non-empty
//! id and finite coordinates.

use crate::error::PresenceError;
use crate::types::{ParticipantId, ParticipantRecord, Rotation, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Announces a participant's presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    /// Participant id
    pub id: ParticipantId,
    /// Display label
    pub username: String,
    /// Initial position
    pub position: Vec3,
    /// Initial orientation
    pub rotation: Rotation,
}

impl From<&ParticipantRecord> for JoinPayload {
    fn from(record: &ParticipantRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record.username.clone(),
            position: record.position,
            rotation: record.rotation,
        }
    }
}

/// Announces a participant's departure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartPayload {
    /// Participant id
    pub id: ParticipantId,
}

/// A position update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPayload {
    /// Participant id
    pub id: ParticipantId,
    /// New position
    pub position: Vec3,
}

/// An orientation update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationPayload {
    /// Participant id
    pub id: ParticipantId,
    /// New orientation
    pub rotation: Rotation,
}

/// A liveness refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    /// Participant id
    pub id: ParticipantId,
}

/// The six protocol events, one schema per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ProtocolEvent {
    /// `character-join`: client→server, server→others
    #[serde(rename = "character-join")]
    Join(JoinPayload),
    /// `character-part`: server→others only
    #[serde(rename = "character-part")]
    Part(PartPayload),
    /// `character-position`: client→server, server→others
    #[serde(rename = "character-position")]
    Position(PositionPayload),
    /// `character-rotation`: client→server, server→others
    #[serde(rename = "character-rotation")]
    Rotation(RotationPayload),
    /// `character-ping`: client→server only
    #[serde(rename = "character-ping")]
    Ping(PingPayload),
    /// `introduce`: client→server request for a full roster resend
    #[serde(rename = "introduce")]
    Introduce,
}

/// Wire names of the protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// `character-join`
    Join,
    /// `character-part`
    Part,
    /// `character-position`
    Position,
    /// `character-rotation`
    Rotation,
    /// `character-ping`
    Ping,
    /// `introduce`
    Introduce,
}

impl EventName {
    /// The name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Join => "character-join",
            EventName::Part => "character-part",
            EventName::Position => "character-position",
            EventName::Rotation => "character-rotation",
            EventName::Ping => "character-ping",
            EventName::Introduce => "introduce",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProtocolEvent {
    /// Decodes and validates a single text frame.
    ///
    /// # Returns
    ///
    /// The decoded event, or [`PresenceError::InvalidPayload`] if the frame is
    /// not valid JSON, names an unknown event, is missing fields, or fails
    /// [`validate`](Self::validate).
    pub fn decode(text: &str) -> Result<Self, PresenceError> {
        let event: ProtocolEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// Encodes the event as a JSON text frame.
    pub fn encode(&self) -> Result<String, PresenceError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks the payload invariants that the type system cannot express.
    ///
    /// Ids must be non-empty and every coordinate must be finite.
    pub fn validate(&self) -> Result<(), PresenceError> {
        if let Some(id) = self.participant_id() {
            if id.is_empty() {
                return Err(PresenceError::InvalidPayload(format!(
                    "{} with empty id",
                    self.name()
                )));
            }
        }

        match self {
            ProtocolEvent::Join(join) => {
                check_position(&join.position)?;
                check_rotation(&join.rotation)
            }
            ProtocolEvent::Position(update) => check_position(&update.position),
            ProtocolEvent::Rotation(update) => check_rotation(&update.rotation),
            ProtocolEvent::Part(_) | ProtocolEvent::Ping(_) | ProtocolEvent::Introduce => Ok(()),
        }
    }

    /// The wire name of this event.
    pub fn name(&self) -> EventName {
        match self {
            ProtocolEvent::Join(_) => EventName::Join,
            ProtocolEvent::Part(_) => EventName::Part,
            ProtocolEvent::Position(_) => EventName::Position,
            ProtocolEvent::Rotation(_) => EventName::Rotation,
            ProtocolEvent::Ping(_) => EventName::Ping,
            ProtocolEvent::Introduce => EventName::Introduce,
        }
    }

    /// The participant this event is about, if any.
    pub fn participant_id(&self) -> Option<&ParticipantId> {
        match self {
            ProtocolEvent::Join(p) => Some(&p.id),
            ProtocolEvent::Part(p) => Some(&p.id),
            ProtocolEvent::Position(p) => Some(&p.id),
            ProtocolEvent::Rotation(p) => Some(&p.id),
            ProtocolEvent::Ping(p) => Some(&p.id),
            ProtocolEvent::Introduce => None,
        }
    }

    /// Builds a `character-part` event.
    pub fn part(id: ParticipantId) -> Self {
        ProtocolEvent::Part(PartPayload { id })
    }
}

pub(crate) fn check_position(position: &Vec3) -> Result<(), PresenceError> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(PresenceError::InvalidPayload(format!(
            "non-finite position {position:?}"
        )))
    }
}

pub(crate) fn check_rotation(rotation: &Rotation) -> Result<(), PresenceError> {
    if rotation.is_finite() {
        Ok(())
    } else {
        Err(PresenceError::InvalidPayload(format!(
            "non-finite rotation {rotation:?}"
        )))
    }
}
