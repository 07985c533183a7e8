use super::classification::Classification;
use crate::config::UpstreamConfig;
use std::time::Duration;

/// Decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Bounded exponential backoff.
///
/// - `attempt` is 0-based (first failure => attempt=0), so at most
///   `max_retries + 1` attempts are made.
/// - A server-supplied retry-after replaces the computed delay and is not capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_delay(),
            config.max_retry_delay(),
        )
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait;
        }
        // base_delay * 2^attempt
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    pub fn decide(&self, classification: &Classification, attempt: u32) -> Decision {
        if classification.retryable && attempt < self.max_retries {
            Decision::Retry {
                delay: self.backoff_delay(attempt, classification.retry_after),
            }
        } else {
            Decision::Fail
        }
    }
}
