//! Retry Policy
//!
//! Pure mapping from `(attempt, error)` to "retry after a delay" or "give up".
//! Delays grow exponentially from the initial interval and are capped at the
//! maximum interval. Configuration errors are never retried.

use crate::error::ActivityError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decision returned by [`RetryPolicy::next_action`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second attempt (milliseconds)
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Ceiling for any single delay (milliseconds)
    #[serde(default = "default_maximum_interval_ms")]
    pub maximum_interval_ms: u64,
    /// Growth factor applied per attempt
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
    /// Attempts per activity invocation, including the first one
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
}

fn default_initial_interval_ms() -> u64 {
    1_000
}

fn default_maximum_interval_ms() -> u64 {
    10_000
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

fn default_maximum_attempts() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            maximum_interval_ms: default_maximum_interval_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_attempts: default_maximum_attempts(),
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.maximum_attempts == 0 {
            return Err("maximum_attempts must be at least 1".to_string());
        }
        if !(self.backoff_coefficient >= 1.0) {
            return Err(format!(
                "backoff_coefficient must be >= 1.0, got {}",
                self.backoff_coefficient
            ));
        }
        if self.maximum_interval_ms < self.initial_interval_ms {
            return Err(format!(
                "maximum_interval_ms ({}) is below initial_interval_ms ({})",
                self.maximum_interval_ms, self.initial_interval_ms
            ));
        }
        Ok(())
    }

    /// Decide what to do after `attempt` (1-based) failed with `error`.
    pub fn next_action(&self, attempt: u32, error: &ActivityError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if attempt >= self.maximum_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }

    /// Backoff delay after the given failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.initial_interval_ms as f64 * self.backoff_coefficient.powi(exponent);
        let capped = if scaled.is_finite() {
            scaled.min(self.maximum_interval_ms as f64)
        } else {
            self.maximum_interval_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}
