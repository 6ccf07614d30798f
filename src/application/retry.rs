//! Bounded retry policy applied explicitly by callers.
//!
//! Retries are never hidden inside low-level I/O calls: a component that
//! wants resilience holds a policy and steps through it.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Backoff before the given attempt (1-based). The first attempt has no
    /// delay; subsequent delays double, capped at 30s.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        let delay = self.base_backoff.saturating_mul(1u32 << exponent);
        delay.min(Duration::from_secs(30))
    }

    pub fn attempts(&self) -> impl Iterator<Item = u32> + use<> {
        1..=self.max_attempts
    }
}
