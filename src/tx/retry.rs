//! Failure classification and the bounded retry schedule

use crate::error::{FailureClass, TipperError};

use std::time::Duration;

/// What the wallet loop does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    /// Stop processing this wallet
    AbortWallet,
    /// Sleep, then re-run the same index
    RetryAfter(Duration),
    /// Give up on this index and move to the next
    Skip,
}

/// Bounded exponential backoff over retryable failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide the next step for `error`, given how many retries this index already used
    pub fn decide(&self, error: &TipperError, retries_used: u32) -> AttemptDecision {
        match error.classify() {
            FailureClass::FatalToWallet => AttemptDecision::AbortWallet,
            FailureClass::SkipAndContinue => AttemptDecision::Skip,
            FailureClass::Retryable if retries_used >= self.max_retries => AttemptDecision::Skip,
            FailureClass::Retryable => AttemptDecision::RetryAfter(self.backoff(retries_used)),
        }
    }

    /// `base * 2^retries_used`, capped at the maximum delay
    pub fn backoff(&self, retries_used: u32) -> Duration {
        let factor = 1u32.checked_shl(retries_used).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2), Duration::from_secs(30))
    }
}
