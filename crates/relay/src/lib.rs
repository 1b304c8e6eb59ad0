//! # Presence Relay - Main Entry Point
//!
//! Standalone WebSocket relay that keeps a registry of connected
//! participants, fans out their joins, moves and departures to everyone else,
//! and evicts participants that stop sending liveness pings.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! relay
//!
//! # Specify custom configuration
//! relay --config production.toml
//!
//! # Override specific settings
//! relay --bind 0.0.0.0:8835 --liveness-timeout 60 --log-level debug
//!
//! # JSON logging for production
//! relay --json-logs
//! ```
//!
//! ## Configuration
//!
//! The relay loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1:8835"
//! max_connections = 1000
//! max_message_size = 16384
//! shutdown_grace_secs = 5
//!
//! [presence]
//! liveness_timeout_secs = 30
//! liveness_sweep_interval_secs = 5
//! introduce_throttle_ms = 1000
//!
//! [logging]
//! level = "info"
//! json_format = false
//! ```
//!
//! ## Signal Handling
//!
//! SIGINT (Ctrl+C) or SIGTERM closes every client connection and stops the
//! relay. A second signal exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;

pub use config::{AppConfig, LoggingSettings, PresenceSettings, ServerSettings};

/// Runs the relay process.
///
/// Parses the command line, loads the configuration, sets up logging and
/// runs the [`Application`] until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging has to come up before the application logs anything, so the
    // file is read once here just for its logging section.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    config.apply_overrides(&args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
