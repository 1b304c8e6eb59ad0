//! Core server implementation and connection handling.
//!
//! This module contains the relay server structure, its accept loop and
//! the per-connection WebSocket handler.

pub mod core;
pub mod handlers;

pub use core::RelayServer;
