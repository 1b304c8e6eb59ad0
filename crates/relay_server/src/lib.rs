//! # Relay Server
//!
//! WebSocket relay that keeps every connected client's view of the shared
//! presence registry up to date.
//!
//! ## Architecture Overview
//!
//! * **Relay Coordinator** - owns the per-connection state machine, applies
//!   inbound protocol events to the registry and fans validated changes out
//!   to every *other* connection
//! * **Connection Manager** - tracks open connections, their bound identity and
//!   their outbound queues
//! * **Liveness Monitor** - periodically evicts participants that stopped
//!   sending liveness signals and announces their departure
//! * **Accept loop** - binds the listener, upgrades TCP streams to WebSockets
//!   and hands each one to a connection handler
//!
//! ### Message Flow
//!
//! 1. Client sends a text frame `{"event": "...", "data": {...}}`
//! 2. The coordinator decodes and validates it (`InvalidPayload` on failure)
//! 3. The matching registry operation runs under the registry lock
//! 4. On success the event is re-encoded and queued to every other connection
//! 5. Rejected events are logged and dropped; the sender gets no reply
//!
//! ## Thread Safety
//!
//! Every registry operation goes through a single `tokio::sync::Mutex`, and
//! fan-out happens while that lock is held, so the order in which clients
//! observe events matches the order in which the registry applied them.
//! Outbound queues are unbounded channels, so fan-out never blocks.

pub use config::ServerConfig;
pub use error::ServerError;
pub use health::{DepartureSink, LivenessConfig, LivenessMonitor};
pub use relay::{Dispatch, RelayCoordinator, SharedRegistry};
pub use server::RelayServer;
pub use shutdown::ShutdownState;
pub use utils::{create_server, create_server_with_config};

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod utils;

#[cfg(test)]
mod tests;
