//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize the relay.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration structure for the relay server.
///
/// Durations are stored as plain integers so the structure serializes cleanly
/// into the application's TOML file; use the accessor methods to get
/// [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Maximum accepted size of a single text frame, in bytes
    pub max_message_size: usize,

    /// Seconds without a liveness signal after which a participant is evicted
    pub liveness_timeout_secs: u64,

    /// Seconds between two liveness sweeps
    pub liveness_sweep_interval_secs: u64,

    /// Window, in milliseconds, within which repeated joins from one
    /// connection produce at most one roster introduction
    pub introduce_throttle_ms: u64,

    /// Seconds to wait for connections to close during shutdown
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    /// Liveness timeout as a [`Duration`].
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    /// Interval between liveness sweeps as a [`Duration`].
    pub fn liveness_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_sweep_interval_secs)
    }

    /// Introduce throttle window as a [`Duration`].
    pub fn introduce_throttle(&self) -> Duration {
        Duration::from_millis(self.introduce_throttle_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 8835)),
            max_connections: 1000,
            max_message_size: 16 * 1024, // 16KB
            liveness_timeout_secs: 30,
            liveness_sweep_interval_secs: 5,
            introduce_throttle_ms: 1000,
            shutdown_grace_secs: 5,
        }
    }
}
