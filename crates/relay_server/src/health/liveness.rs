//! Periodic eviction of silent participants.

use crate::config::ServerConfig;
use crate::relay::SharedRegistry;
use crate::shutdown::ShutdownState;
use presence_core::ParticipantRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Receives every participant the monitor evicts.
///
/// Called while the registry lock is held, so implementations must not
/// block and must not touch the registry.
pub trait DepartureSink: Send + Sync {
    /// Announces that `record` has been removed for inactivity.
    fn participant_expired(&self, record: &ParticipantRecord);
}

/// Timing parameters for the liveness monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Silence after which a participant is evicted
    pub timeout: Duration,
    /// Time between two sweeps
    pub sweep_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl From<&ServerConfig> for LivenessConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            timeout: config.liveness_timeout(),
            sweep_interval: config.liveness_sweep_interval(),
        }
    }
}

/// Evicts participants whose last liveness signal is older than the timeout.
///
/// The monitor and the relay coordinator share one registry mutex; every
/// eviction and its departure announcement happen inside a single critical
/// section.
pub struct LivenessMonitor {
    registry: SharedRegistry,
    sink: Arc<dyn DepartureSink>,
    config: LivenessConfig,
}

impl LivenessMonitor {
    /// Creates a new monitor.
    ///
    /// # Arguments
    ///
    /// * `registry` - The registry shared with the relay coordinator
    /// * `sink` - Where departures are announced
    /// * `config` - Timeout and sweep interval
    pub fn new(
        registry: SharedRegistry,
        sink: Arc<dyn DepartureSink>,
        config: LivenessConfig,
    ) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }

    /// The monitor's timing parameters.
    pub fn config(&self) -> LivenessConfig {
        self.config
    }

    /// Runs one sweep now.
    ///
    /// # Returns
    ///
    /// The evicted records in registry insertion order.
    pub async fn sweep(&self) -> Vec<ParticipantRecord> {
        let Some(threshold) = Instant::now().checked_sub(self.config.timeout) else {
            return Vec::new();
        };

        let mut registry = self.registry.lock().await;
        let expired = registry.expire_older_than(threshold);
        for record in &expired {
            info!(
                "⏰ Participant {} ({}) timed out after {:?} of silence",
                record.id, record.username, self.config.timeout
            );
            self.sink.participant_expired(record);
        }
        if !expired.is_empty() {
            debug!("🧹 Liveness sweep evicted {} participants", expired.len());
        }
        expired
    }

    /// Sweeps every `sweep_interval` until shutdown is initiated.
    ///
    /// The first sweep happens one interval after the call.
    pub async fn run(&self, shutdown: ShutdownState) {
        // A zero period would make `interval_at` panic.
        let period = self.config.sweep_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let stopped = shutdown.wait();
        tokio::pin!(stopped);

        info!(
            "💓 Liveness monitor started (timeout {:?}, sweep every {:?})",
            self.config.timeout, period
        );
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        info!("💓 Liveness monitor stopped");
    }

    /// Runs the monitor on its own task.
    ///
    /// The task ends when shutdown is initiated; the handle may also be
    /// aborted.
    pub fn spawn(self, shutdown: ShutdownState) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
