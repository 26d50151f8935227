//! Bounded retry policy with exponential backoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How often and how patiently a step is retried.
///
/// The first invocation runs immediately. The delay after the `k`-th failed
/// invocation (1-based) is `min(base_delay * multiplier^(k-1), max_delay)`.
/// No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Run once, never retry.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay to wait after `failures` failed invocations.
    ///
    /// `failures` is 1-based; zero returns [`Duration::ZERO`].
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0)).min(self.max_delay)
    }

    /// Budget for the first invocation.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            attempt: 1,
            max_attempts: self.max_attempts.max(1),
            next_delay: self.delay_after(1),
        }
    }

    /// Whether another invocation is allowed after `attempts` have run.
    pub const fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Check the policy for values that would make it useless.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(format!(
                "max_delay ({:?}) must not be shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            ));
        }
        Ok(())
    }
}

/// Position within one retryable step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// 1-based number of the invocation about to run.
    pub attempt: u32,
    /// Total invocations allowed.
    pub max_attempts: u32,
    /// Delay that follows if this invocation fails.
    pub next_delay: Duration,
}

impl RetryBudget {
    /// Whether this is the last invocation the policy allows.
    pub const fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Budget for the following invocation.
    #[must_use]
    pub fn advance(&self, policy: &RetryPolicy) -> Self {
        let attempt = self.attempt.saturating_add(1);
        Self {
            attempt,
            max_attempts: self.max_attempts,
            next_delay: policy.delay_after(attempt),
        }
    }

    pub const fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

/// A retried step gave up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct Exhausted<E: std::fmt::Display> {
    /// Invocations actually made.
    pub attempts: u32,
    /// Error from the final invocation.
    pub last: E,
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
