//! Linear backoff for connect retries

use std::time::Duration;

use gl_core::config::RetryConfig;

/// Linear backoff with a fixed attempt budget.
///
/// After failed attempt `n` the caller waits `step * n` before the next
/// attempt. No wait follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Base delay
    step: Duration,
    /// Total attempts, including the first
    max_attempts: u32,
}

impl LinearBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.delay, config.max_attempts)
    }

    /// Create a new backoff with custom parameters. A budget of zero is
    /// treated as a single attempt.
    pub fn new(step: Duration, max_attempts: u32) -> Self {
        Self {
            step,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after attempt `attempt` (1-based) has failed, or
    /// `None` if it was the last one
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(self.step.saturating_mul(attempt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly() {
        let backoff = LinearBackoff::new(Duration::from_secs(1), 4);

        assert_eq!(backoff.delay_after(1), Some(Duration::from_secs(1)));
        assert_eq!(backoff.delay_after(2), Some(Duration::from_secs(2)));
        assert_eq!(backoff.delay_after(3), Some(Duration::from_secs(3)));
        assert_eq!(backoff.delay_after(4), None); // No wait after the last attempt
    }

    #[test]
    fn test_zero_budget_means_one_attempt() {
        let backoff = LinearBackoff::new(Duration::from_millis(500), 0);
        assert_eq!(backoff.max_attempts(), 1);
        assert_eq!(backoff.delay_after(1), None);
    }

    #[test]
    fn test_from_config() {
        let backoff = LinearBackoff::from_config(&RetryConfig::default());
        assert_eq!(backoff.max_attempts(), 3);
        assert_eq!(backoff.delay_after(2), Some(Duration::from_secs(2)));
    }
}
