// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry budget for protocol operations.

use std::time::Duration;

/// Bounded retry budget: a fixed number of attempts separated by a delay.
///
/// The budget is a value, recomputed for every operation; nothing about
/// past operations is remembered.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use psucontrol_outlet::protocol::RetryPolicy;
///
/// // Default: 3 attempts, 2 seconds apart
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
///
/// // Custom policy with exponential backoff
/// let policy = RetryPolicy::new()
///     .with_max_attempts(5)
///     .with_delay(Duration::from_millis(500))
///     .with_backoff_multiplier(2.0)
///     .with_max_delay(Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl RetryPolicy {
    /// Default number of attempts per operation.
    pub const MAX_RETRIES: u32 = 3;
    /// Default delay between attempts.
    pub const RETRY_DELAY: Duration = Duration::from_secs(2);

    /// Creates a policy with the default budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the total number of attempts (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the upper bound of the delay when backing off.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier (1.0 keeps the delay fixed).
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the total number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true if another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Calculates the delay to wait after the failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.powi(exponent);

        // Delays are seconds, far from f32 precision limits
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.delay.as_millis() as f32 * multiplier;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::MAX_RETRIES,
            delay: Self::RETRY_DELAY,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn default_delay_is_fixed() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(2));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new()
            .with_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[test]
    fn no_retry_makes_one_attempt() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy::new().with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }
}
