//! Core relay server implementation.
//!
//! This module contains the main `RelayServer` struct: listener binding,
//! the accept loop, the liveness monitor task and connection draining at
//! shutdown.

use crate::{
    config::ServerConfig,
    error::ServerError,
    health::LivenessConfig,
    relay::RelayCoordinator,
    server::handlers::handle_connection,
    shutdown::ShutdownState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often connection draining re-checks the open connection count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pause after a failed `accept` (e.g. descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The presence relay server.
///
/// # Architecture
///
/// * **Relay Coordinator**: applies client events and fans them out
/// * **Liveness Monitor**: evicts silent participants, started with the accept loop
/// * **Accept Loop**: one task per accepted connection, stops on shutdown
pub struct RelayServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Coordinator shared with every connection handler
    coordinator: Arc<RelayCoordinator>,
}

impl RelayServer {
    /// Creates a new relay server with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    ///
    /// # Returns
    ///
    /// A new `RelayServer` with an empty registry, ready to be started.
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Arc::new(RelayCoordinator::new(&config));
        Self {
            config,
            coordinator,
        }
    }

    /// The server's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The relay coordinator.
    pub fn coordinator(&self) -> &Arc<RelayCoordinator> {
        &self.coordinator
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })
    }

    /// Binds the listener and serves until shutdown is initiated.
    ///
    /// # Arguments
    ///
    /// * `shutdown_state` - Shared shutdown state for coordinating graceful shutdown
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server started and stopped cleanly, or a `ServerError`
    /// if binding failed or a background task died.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_state).await
    }

    /// Runs the accept loop and the liveness monitor on an already bound
    /// listener until shutdown is initiated.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        match local_addr {
            Some(addr) => info!("🚀 Presence relay listening on {}", addr),
            None => info!("🚀 Presence relay listening on {}", self.config.bind_address),
        }

        let monitor = self
            .coordinator
            .liveness_monitor(LivenessConfig::from(&self.config))
            .spawn(shutdown_state.clone());

        let stopped = shutdown_state.wait();
        tokio::pin!(stopped);

        loop {
            tokio::select! {
                _ = &mut stopped => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let open = self.coordinator.connections().connection_count();
                        if open >= self.config.max_connections {
                            warn!(
                                "🚫 Refusing {}: {} connections already open",
                                addr, open
                            );
                            drop(stream);
                            continue;
                        }

                        let coordinator = self.coordinator.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, coordinator).await {
                                warn!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        monitor
            .await
            .map_err(|e| ServerError::Internal(format!("Liveness monitor failed: {e}")))?;
        info!("Server stopped");
        Ok(())
    }

    /// Asks every connection to close and waits up to the configured grace
    /// period for them to go away.
    ///
    /// # Returns
    ///
    /// `ServerError::Shutdown` if any connection was still open when the
    /// grace period ran out.
    pub async fn close_connections(&self) -> Result<(), ServerError> {
        let requested = self.coordinator.close_all("server shutting down");
        let grace = self.config.shutdown_grace();
        let deadline = Instant::now() + grace;

        let connections = self.coordinator.connections();
        while !connections.is_empty() && Instant::now() < deadline {
            sleep(DRAIN_POLL_INTERVAL).await;
        }

        let remaining = connections.connection_count();
        if remaining == 0 {
            debug!("All {} connections closed", requested);
            Ok(())
        } else {
            Err(ServerError::Shutdown(format!(
                "{remaining} of {requested} connections still open after {grace:?}"
            )))
        }
    }

    /// Initiates shutdown, drains connections and marks shutdown complete.
    pub async fn shutdown(&self, shutdown_state: &ShutdownState) -> Result<(), ServerError> {
        shutdown_state.initiate_shutdown();
        let result = self.close_connections().await;
        shutdown_state.complete_shutdown();
        result
    }
}
