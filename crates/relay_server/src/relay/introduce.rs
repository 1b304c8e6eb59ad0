//! Leading-edge throttle for roster introductions.

use std::time::Duration;
use tokio::time::Instant;

/// Lets one introduction through per window; everything else inside the
/// window is dropped, not deferred.
#[derive(Debug, Clone)]
pub struct IntroduceThrottle {
    window: Duration,
    last_fired: Option<Instant>,
}

impl IntroduceThrottle {
    /// Creates a throttle that has never fired.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    /// Returns true and starts a new window if `now` is outside the current one.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let open = match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if open {
            self.last_fired = Some(now);
        }
        open
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }
}
