//! Bounded retry schedule with exponential backoff.
//!
//! The schedule only decides; sleeping is left to the caller so it can be driven by a
//! simulated clock.
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::types::{OutcomeStatus, RowIndex};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            factor: 1.8,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded.
    Accept,
    Retry { attempt: u32, delay: Duration },
    /// Permanent failure or retries exhausted.
    GiveUp,
}

/// Attempt counter for one row.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Number of the attempt about to be made (1-based).
    pub fn next_attempt(&self) -> u32 {
        self.attempts + 1
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the status of the attempt just made and decide what happens next.
    pub fn record(&mut self, status: &OutcomeStatus) -> RetryDecision {
        self.attempts += 1;
        if status.is_success() {
            return RetryDecision::Accept;
        }
        if !status.is_retryable() {
            return RetryDecision::GiveUp;
        }
        let retry = self.attempts;
        if retry > self.policy.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            attempt: self.attempts + 1,
            delay: self.policy.delay_for(retry),
        }
    }
}

/// Jitter in `[0, max)` derived from the row index, stable across runs.
pub fn row_jitter(row: RowIndex, max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let digest = Sha256::digest((row as u64).to_le_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let fraction = (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64;
    max.mul_f64(fraction)
}
