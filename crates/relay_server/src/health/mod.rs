//! Participant health tracking.
//!
//! Connections can vanish without a clean close, so presence is also bounded
//! by time: a participant that has not sent a join, pose update or ping
//! within the liveness timeout is evicted by the [`LivenessMonitor`].

pub mod liveness;

pub use liveness::{DepartureSink, LivenessConfig, LivenessMonitor};
