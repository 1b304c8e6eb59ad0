//! Protocol relay: applies client events to the shared registry and fans
//! the accepted ones out to every other connection.
//!
//! ## Connection states
//!
//! `Connected` (no identity) → `Identified(id)` after an accepted
//! `character-join` → closed once removed from the connection manager.
//! A second accepted join on the same connection rebinds it and parts the
//! participant it was bound to before.

pub mod coordinator;
pub mod introduce;

pub use coordinator::{Dispatch, RelayCoordinator, SharedRegistry};
pub use introduce::IntroduceThrottle;
