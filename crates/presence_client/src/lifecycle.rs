//! Connection lifecycle and reconnection policy.
//!
//! [`ConnectionLifecycle`] is a plain state machine: the transport reports
//! what happened to each attempt and the lifecycle answers whether, and
//! after how long, to try again. Consecutive failures are capped; once the
//! cap is hit the link is [`LinkStatus::GaveUp`] for good.
//!
//! ```text
//! Idle ──begin_attempt──▶ Connecting ──on_connected──▶ Connected
//!                            │  ▲                         │
//!          on_attempt_failed │  │ begin_attempt           │ on_disconnected
//!                            ▼  │                         ▼
//!                         Disconnected ◀──────────────────┘
//!                            │
//!                            └─(cap reached)──▶ GaveUp
//! ```

use crate::error::ClientError;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Backoff parameters for reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts after which the client gives up
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any retry delay
    pub max_delay: Duration,
    /// Growth factor between consecutive retries
    pub multiplier: f64,
    /// Relative jitter applied to each delay, in `0.0..=1.0`
    pub randomization_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            randomization_factor: 0.5,
        }
    }
}

impl ReconnectPolicy {
    /// The un-jittered delay before retry number `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// The delay before retry number `attempt`, with jitter applied.
    ///
    /// Never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let factor = self.randomization_factor.clamp(0.0, 1.0);
        if factor == 0.0 || base == 0.0 {
            return Duration::from_secs_f64(base);
        }
        let jitter = rand::thread_rng().gen_range(-factor..=factor);
        let jittered = (base * (1.0 + jitter)).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Where the link to the relay stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    /// No attempt made yet
    #[default]
    Idle,
    /// An attempt is in flight
    Connecting,
    /// Open and identified
    Connected,
    /// Lost or failed; a retry may follow
    Disconnected,
    /// Reconnection cap reached; terminal
    GaveUp,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkStatus::Idle => "idle",
            LinkStatus::Connecting => "connecting",
            LinkStatus::Connected => "connected",
            LinkStatus::Disconnected => "disconnected",
            LinkStatus::GaveUp => "gave up",
        };
        f.write_str(label)
    }
}

/// Result of a successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// First successful connection
    Connected,
    /// A later successful connection
    Reconnected,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after this delay
    RetryAfter(Duration),
    /// Stop; the cap has been reached
    GiveUp,
}

/// Status published by the transport on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkSnapshot {
    /// Current link status
    pub status: LinkStatus,
    /// Successful reconnections so far
    pub reconnects: u32,
}

/// Tracks attempts, reconnections and the give-up cap.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    policy: ReconnectPolicy,
    status: LinkStatus,
    reconnects: u32,
    failed_attempts: u32,
    ever_connected: bool,
}

impl ConnectionLifecycle {
    /// Creates an idle lifecycle.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            status: LinkStatus::Idle,
            reconnects: 0,
            failed_attempts: 0,
            ever_connected: false,
        }
    }

    /// Marks an attempt as started.
    ///
    /// # Errors
    ///
    /// [`ClientError::GaveUp`] once the cap has been reached.
    pub fn begin_attempt(&mut self) -> Result<(), ClientError> {
        if self.status == LinkStatus::GaveUp {
            return Err(ClientError::GaveUp {
                attempts: self.failed_attempts,
            });
        }
        self.status = LinkStatus::Connecting;
        Ok(())
    }

    /// Records a successful attempt and resets the failure count.
    ///
    /// Only connections after the first count as reconnections.
    pub fn on_connected(&mut self) -> ConnectOutcome {
        self.status = LinkStatus::Connected;
        self.failed_attempts = 0;
        if self.ever_connected {
            self.reconnects += 1;
            ConnectOutcome::Reconnected
        } else {
            self.ever_connected = true;
            ConnectOutcome::Connected
        }
    }

    /// Records the loss of an open connection.
    pub fn on_disconnected(&mut self) {
        if self.status != LinkStatus::GaveUp {
            self.status = LinkStatus::Disconnected;
        }
    }

    /// Records a failed attempt and decides whether to retry.
    pub fn on_attempt_failed(&mut self) -> RetryDecision {
        if self.status == LinkStatus::GaveUp {
            return RetryDecision::GiveUp;
        }
        self.failed_attempts += 1;
        if self.failed_attempts >= self.policy.max_attempts {
            self.status = LinkStatus::GaveUp;
            RetryDecision::GiveUp
        } else {
            self.status = LinkStatus::Disconnected;
            RetryDecision::RetryAfter(self.policy.delay_for(self.failed_attempts))
        }
    }

    /// Delay before the next attempt after a lost connection.
    pub fn next_delay(&self) -> Duration {
        self.policy.delay_for(self.failed_attempts + 1)
    }

    /// Current status.
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Successful reconnections so far.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Consecutive failed attempts since the last success.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// The reconnection policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Status and reconnect count, as published to watchers.
    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            status: self.status,
            reconnects: self.reconnects,
        }
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
