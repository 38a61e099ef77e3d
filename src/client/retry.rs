//! Submission retry settings.

use std::time::Duration;

use crate::config::SubmissionConfig;

/// Bounded, fixed-delay retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Sleep between attempts; nothing after the last one.
    pub fn pause_after(&self, attempt: u32) {
        if attempt < self.attempts && !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl From<&SubmissionConfig> for RetryPolicy {
    fn from(config: &SubmissionConfig) -> Self {
        Self::new(config.attempts, Duration::from_secs(config.retry_delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from(&SubmissionConfig::default());
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
