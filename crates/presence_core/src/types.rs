//! Core data types for participants and their pose.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Opaque identifier for a participant.
///
/// Ids are chosen by the client, not the server. The registry only guarantees
/// that no two present participants share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wraps a string as a participant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty id, which the protocol never accepts.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 3D vector used for participant positions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate
    pub x: f64,
    /// Y coordinate (vertical axis)
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3 with the specified coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (0, 0, 0).
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Euclidean distance to another vector.
    pub fn distance(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Returns true when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Orientation of a participant.
///
/// Clients may send either Euler angles or a quaternion; the relay does not
/// convert between them and simply forwards whatever was accepted. A payload
/// carrying a numeric `w` decodes as a quaternion; exactly `x`, `y` and `z`
/// decode as Euler angles. Anything else, including a `w` that is not a
/// number, is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rotation {
    /// Unit quaternion
    Quaternion {
        /// X component
        x: f64,
        /// Y component
        y: f64,
        /// Z component
        z: f64,
        /// Scalar component
        w: f64,
    },
    /// Euler angles in degrees
    Euler {
        /// Pitch
        x: f64,
        /// Yaw
        y: f64,
        /// Roll
        z: f64,
    },
}

impl Rotation {
    /// The "looking straight ahead" orientation, as zero Euler angles.
    pub fn identity() -> Self {
        Rotation::Euler {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Creates an orientation from Euler angles.
    pub fn euler(x: f64, y: f64, z: f64) -> Self {
        Rotation::Euler { x, y, z }
    }

    /// Returns true when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        match *self {
            Rotation::Quaternion { x, y, z, w } => {
                x.is_finite() && y.is_finite() && z.is_finite() && w.is_finite()
            }
            Rotation::Euler { x, y, z } => x.is_finite() && y.is_finite() && z.is_finite(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RotationRepr {
    Quaternion(QuaternionRepr),
    Euler(EulerRepr),
}

#[derive(Deserialize)]
struct QuaternionRepr {
    x: f64,
    y: f64,
    z: f64,
    w: f64,
}

// Strict so a quaternion with a bad `w` cannot fall through as Euler angles.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EulerRepr {
    x: f64,
    y: f64,
    z: f64,
}

impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RotationRepr::deserialize(deserializer)? {
            RotationRepr::Quaternion(QuaternionRepr { x, y, z, w }) => {
                Rotation::Quaternion { x, y, z, w }
            }
            RotationRepr::Euler(EulerRepr { x, y, z }) => Rotation::Euler { x, y, z },
        })
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

/// A participant as stored by the registry.
///
/// Callers only ever see clones of these; the registry keeps the originals.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    /// Unique id, assigned by the client
    pub id: ParticipantId,
    /// Display label, informational only
    pub username: String,
    /// Last accepted position
    pub position: Vec3,
    /// Last accepted orientation
    pub rotation: Rotation,
    /// Time of the most recent liveness signal (join, pose update or ping)
    pub last_seen: Instant,
}
