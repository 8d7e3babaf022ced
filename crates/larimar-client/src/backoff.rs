//! Reconnect backoff state.
//!
//! Each relay connection owns one [`ReconnectBackoff`]. Failures double the
//! retry delay from a 1 second floor up to a 5 minute cap; a hard failure
//! (host unreachable) jumps straight to a full day so a dead relay is not
//! hammered. A successful connect or a clean, locally-initiated disconnect
//! resets the delay to the floor immediately.

use std::time::{Duration, Instant};

/// Backoff timing parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial and minimum retry delay.
    pub floor: Duration,
    /// Maximum retry delay for ordinary failures.
    pub cap: Duration,
    /// Retry delay after a hard failure (host unreachable).
    pub hard: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            cap: Duration::from_secs(300),
            hard: Duration::from_secs(86_400),
        }
    }
}

/// Per-relay reconnect delay state machine.
#[derive(Debug)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    delay: Duration,
    failures: u32,
    last_attempt: Option<Instant>,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let delay = config.floor;
        Self {
            config,
            delay,
            failures: 0,
            last_attempt: None,
        }
    }

    /// Record that a connection attempt is starting now.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Record a failed session. `hard` marks unreachable-class failures.
    pub fn on_failure(&mut self, hard: bool) {
        self.failures += 1;
        self.delay = if hard {
            self.config.hard
        } else if self.failures == 1 {
            self.config.floor
        } else {
            (self.delay * 2).min(self.config.cap)
        };
    }

    /// Record a successful connect: delay returns to the floor.
    pub fn on_success(&mut self) {
        self.failures = 0;
        self.delay = self.config.floor;
    }

    /// Reset after a clean, locally-initiated disconnect.
    pub fn reset(&mut self) {
        self.on_success();
    }

    /// Whether enough time has passed since the last attempt to try again.
    pub fn window_elapsed(&self, now: Instant) -> bool {
        match self.last_attempt {
            Some(at) => now.saturating_duration_since(at) >= self.delay,
            None => true,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_up_to_cap() {
        let config = BackoffConfig::default();
        let cap = config.cap;
        let mut backoff = ReconnectBackoff::new(config);

        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
        backoff.on_failure(false);
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
        backoff.on_failure(false);
        assert_eq!(backoff.current_delay(), Duration::from_secs(2));
        backoff.on_failure(false);
        assert_eq!(backoff.current_delay(), Duration::from_secs(4));

        // Never exceeds the cap no matter how many failures.
        for _ in 0..64 {
            backoff.on_failure(false);
            assert!(backoff.current_delay() <= cap);
        }
        assert_eq!(backoff.current_delay(), cap);
    }

    #[test]
    fn test_hard_failure_jumps_to_a_day() {
        let mut backoff = ReconnectBackoff::new(BackoffConfig::default());
        backoff.on_failure(true);
        assert_eq!(backoff.current_delay(), Duration::from_secs(86_400));

        // A soft failure afterwards caps back down.
        backoff.on_failure(false);
        assert_eq!(backoff.current_delay(), Duration::from_secs(300));
    }

    #[test]
    fn test_success_resets_to_floor() {
        let mut backoff = ReconnectBackoff::new(BackoffConfig::default());
        for _ in 0..10 {
            backoff.on_failure(false);
        }
        assert!(backoff.current_delay() > Duration::from_secs(1));

        backoff.on_success();
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
        assert_eq!(backoff.failure_count(), 0);
    }

    #[test]
    fn test_window_elapsed() {
        let mut backoff = ReconnectBackoff::new(BackoffConfig::default());
        let start = Instant::now();

        // Never attempted: always ready.
        assert!(backoff.window_elapsed(start));

        backoff.record_attempt(start);
        backoff.on_failure(false);
        backoff.on_failure(false); // delay now 2s
        assert!(!backoff.window_elapsed(start + Duration::from_secs(1)));
        assert!(backoff.window_elapsed(start + Duration::from_secs(2)));
    }
}
