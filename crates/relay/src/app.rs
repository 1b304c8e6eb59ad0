//! Main application logic and lifecycle management.
//!
//! [`Application`] merges the configuration file with command-line overrides,
//! starts the relay and drives its shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_signal},
};
use relay_server::{RelayServer, ServerError, ShutdownState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The running relay process.
pub struct Application {
    /// Merged and validated configuration
    config: AppConfig,
    /// Relay server instance
    server: Arc<RelayServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Returns
    ///
    /// A configured `Application` ready to run, or an error if the
    /// configuration could not be loaded or is invalid.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Build the relay server
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_overrides(&args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        let server_config = config.to_server_config()?;
        let server = Arc::new(RelayServer::new(server_config));

        Ok(Self { config, server })
    }

    /// Runs the relay until a shutdown signal arrives or the server fails.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a graceful shutdown. An error if the server could not
    /// start, stopped on its own, or connections did not drain within the
    /// grace period.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();

        let mut server_handle = {
            let server = self.server.clone();
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        info!("✅ Presence relay is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            finished = &mut server_handle => {
                // The server only returns on its own when it failed to start.
                shutdown_state.initiate_shutdown();
                shutdown_state.complete_shutdown();
                return match finished {
                    Ok(Ok(())) => Err("Server stopped unexpectedly".into()),
                    Ok(Err(e)) => {
                        error!("❌ Server error: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(format!("Server task failed: {e}").into()),
                };
            }
            signalled = wait_for_shutdown_signal(&shutdown_state) => {
                if let Err(e) = signalled {
                    error!("Failed to install signal handlers: {e}");
                    shutdown_state.initiate_shutdown();
                }
            }
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        info!("📡 Phase 1: Closing client connections...");
        let drained = self.server.close_connections().await;
        match &drained {
            Ok(()) => info!("✅ All connections closed"),
            Err(e) => warn!("⏰ {}", e),
        }

        info!("⏳ Phase 2: Waiting for the accept loop and liveness monitor...");
        let stopped = server_handle
            .await
            .map_err(|e| ServerError::Internal(format!("Server task failed: {e}")))?;
        shutdown_state.complete_shutdown();

        stopped?;
        drained?;
        info!("✅ Presence relay shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  🔗 Max connections: {}", self.config.server.max_connections);
        info!("  📦 Max message size: {} bytes", self.config.server.max_message_size);
        info!(
            "  💓 Liveness: {}s timeout, swept every {}s",
            self.config.presence.liveness_timeout_secs,
            self.config.presence.liveness_sweep_interval_secs
        );
        info!("  👋 Introduce throttle: {}ms", self.config.presence.introduce_throttle_ms);
        info!("  📝 Log level: {}", self.config.logging.level);
    }
}

impl AppConfig {
    /// Applies command-line overrides on top of file settings.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }

        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }

        if args.json_logs {
            self.logging.json_format = true;
        }

        if let Some(timeout) = args.liveness_timeout_secs {
            self.presence.liveness_timeout_secs = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(config_path: std::path::PathBuf) -> CliArgs {
        CliArgs {
            config_path,
            bind_address: None,
            log_level: None,
            json_logs: false,
            liveness_timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn test_cli_overrides_file_settings() {
        let dir = TempDir::new().expect("temp dir");
        let mut args = args(dir.path().join("relay.toml"));
        args.bind_address = Some("127.0.0.1:0".to_string());
        args.log_level = Some("debug".to_string());
        args.liveness_timeout_secs = Some(90);

        let app = Application::new(args).await.expect("application builds");
        assert_eq!(app.config.server.bind_address, "127.0.0.1:0");
        assert_eq!(app.config.logging.level, "debug");
        assert_eq!(app.config.presence.liveness_timeout_secs, 90);
        assert_eq!(app.server.config().liveness_timeout_secs, 90);
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let mut args = args(dir.path().join("relay.toml"));
        // Shorter than the default sweep interval.
        args.liveness_timeout_secs = Some(1);

        assert!(Application::new(args).await.is_err());
    }

    #[tokio::test]
    async fn test_run_fails_when_address_is_taken() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let dir = TempDir::new().expect("temp dir");
        let mut args = args(dir.path().join("relay.toml"));
        args.bind_address = Some(taken.local_addr().expect("addr").to_string());

        let app = Application::new(args).await.expect("application builds");
        assert!(app.run().await.is_err());
    }
}
