//! Shutdown coordination for graceful server shutdown.
//!
//! Shared state that lets the accept loop, the liveness monitor and the
//! application layer agree on when to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Set once shutdown has been initiated - no new connections are accepted
    shutdown_initiated: Arc<watch::Sender<bool>>,
    /// Set once every connection has been asked to close
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    /// Creates a new shutdown state with both flags cleared.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            shutdown_initiated: Arc::new(sender),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.shutdown_initiated.borrow()
    }

    /// Returns true if shutdown is complete and final cleanup can begin.
    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Initiates shutdown and wakes every task waiting in [`wait`](Self::wait).
    pub fn initiate_shutdown(&self) {
        if !self.shutdown_initiated.send_replace(true) {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
    }

    /// Marks shutdown as complete.
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ All connections released - ready for final cleanup");
    }

    /// Resolves once shutdown has been initiated.
    ///
    /// Returns immediately if it already was.
    pub async fn wait(&self) {
        let mut receiver = self.shutdown_initiated.subscribe();
        // The sender lives as long as `self`, so this cannot fail while we wait.
        let _ = receiver.wait_for(|initiated| *initiated).await;
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_initiate() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown_initiated());

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait().await })
        };

        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
        assert!(state.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_initiated() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.wait())
            .await
            .expect("already initiated");
    }

    #[test]
    fn test_complete_flag() {
        let state = ShutdownState::default();
        assert!(!state.is_shutdown_complete());
        state.complete_shutdown();
        assert!(state.is_shutdown_complete());
    }
}
