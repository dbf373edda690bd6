use std::time::Duration;

/// Attempt budget and backoff schedule for one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Rate-limit resends allowed per call before giving up
    pub max_rate_limit_waits: u32,
}

/// Default cap on rate-limit resends per call
pub const DEFAULT_RATE_LIMIT_WAITS: u32 = 5;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_rate_limit_waits: DEFAULT_RATE_LIMIT_WAITS,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; a zero attempt budget is raised to one
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            max_rate_limit_waits: DEFAULT_RATE_LIMIT_WAITS,
        }
    }

    /// Sets the cap on rate-limit resends per call
    pub fn with_rate_limit_waits(mut self, max_rate_limit_waits: u32) -> Self {
        self.max_rate_limit_waits = max_rate_limit_waits;
        self
    }

    /// Sleep before resending a rate-limited request
    ///
    /// Never shorter than `base_delay`, so a reset time in the past does
    /// not turn into back-to-back requests.
    pub fn rate_limit_sleep(&self, wait: Duration) -> Duration {
        wait.max(self.base_delay)
    }

    /// Whether another rate-limit resend may follow `waits_made` ones
    pub fn allows_rate_limit_wait(&self, waits_made: u32) -> bool {
        waits_made < self.max_rate_limit_waits
    }

    /// Delay to sleep before attempt `attempt` (0-based)
    ///
    /// Attempt 0 runs immediately; attempt k waits `base_delay * 2^(k-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether another attempt may follow `attempts_made` failed ones
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_retries
    }
}

/// Seconds to wait for a rate-limit window to reset
///
/// `max(0, reset - now + 1)`; a reset time in the past yields zero.
pub fn rate_limit_wait(reset_epoch: i64, now_epoch: i64) -> Duration {
    let secs = reset_epoch.saturating_sub(now_epoch).saturating_add(1).max(0);
    Duration::from_secs(secs as u64)
}
