//! Retry policy
//!
//! Exponential backoff with a symmetric jitter band and a hard ceiling.
//! The jitter factor is drawn once per logical request (see
//! [`RetryPolicy::jitter_sample`]) so that, for a fixed seed, successive
//! delays never decrease.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;
use crate::utils::duration_serde::millis;

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; at most `max_retries + 1` attempts are made
    pub max_retries: u32,
    /// Initial delay between retries
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Maximum delay between retries (also caps server retry hints)
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Backoff multiplier (for exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Seed for the jitter source. `None` draws from the thread RNG.
    pub seed: Option<u64>,
    /// Custom retry condition function
    #[serde(skip)]
    pub retry_condition: Option<fn(&LlmError) -> bool>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::defaults::retry::MAX_RETRIES,
            initial_delay: crate::defaults::retry::INITIAL_DELAY,
            max_delay: crate::defaults::retry::MAX_DELAY,
            backoff_multiplier: crate::defaults::retry::BACKOFF_MULTIPLIER,
            use_jitter: true,
            jitter_factor: crate::defaults::retry::JITTER_FACTOR,
            seed: None,
            retry_condition: None,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::default().with_max_retries(0)
    }

    /// Set maximum retries
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Set jitter factor
    pub const fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Make jitter reproducible.
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set custom retry condition
    pub fn with_retry_condition(mut self, condition: fn(&LlmError) -> bool) -> Self {
        self.retry_condition = Some(condition);
        self
    }

    /// Total number of attempts this policy allows.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Check if an error should be retried. Cancellation never is.
    pub fn should_retry(&self, error: &LlmError) -> bool {
        if error.is_cancelled() {
            return false;
        }
        if let Some(condition) = self.retry_condition {
            condition(error)
        } else {
            error.is_retryable()
        }
    }

    /// Check the policy for values that would make the delay sequence meaningless.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.initial_delay > self.max_delay {
            return Err(LlmError::ConfigurationError(format!(
                "retry initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(LlmError::ConfigurationError(format!(
                "retry backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(LlmError::ConfigurationError(format!(
                "retry jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }

    /// Draw the per-request jitter factor in `[-jitter_factor, jitter_factor]`.
    ///
    /// Returns `0.0` when jitter is disabled.
    pub fn jitter_sample(&self) -> f64 {
        if !self.use_jitter || self.jitter_factor <= 0.0 {
            return 0.0;
        }
        let band = self.jitter_factor;
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed).gen_range(-band..=band),
            None => rand::thread_rng().gen_range(-band..=band),
        }
    }

    /// Un-jittered delay for a zero-based retry index, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exp);
        let max_millis = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Delay for a zero-based retry index given a jitter factor from
    /// [`jitter_sample`](Self::jitter_sample).
    ///
    /// The perturbed value is clamped to `[initial_delay, max_delay]`.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let base = self.base_delay(attempt);
        if jitter == 0.0 {
            return base;
        }
        let jittered = base.as_millis() as f64 * (1.0 + jitter);
        let floor = self.initial_delay.min(self.max_delay).as_millis() as f64;
        let ceil = self.max_delay.as_millis() as f64;
        Duration::from_millis(jittered.clamp(floor, ceil) as u64)
    }

    /// Calculate delay for a given attempt with a fresh jitter draw
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, self.jitter_sample())
    }

    /// A server-suggested delay, capped at `max_delay`.
    pub fn clamp_hint(&self, hint: Duration) -> Duration {
        hint.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
            .with_jitter(false);
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(250));
        assert_eq!(policy.calculate_delay(200), Duration::from_millis(250));
    }

    #[test]
    fn jittered_delay_never_drops_below_initial() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.delay_for(0, -0.25), Duration::from_millis(100));
        assert_eq!(policy.delay_for(0, 0.25), Duration::from_millis(125));
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let policy = RetryPolicy::new().with_seed(7);
        assert_eq!(policy.jitter_sample(), policy.jitter_sample());
        assert!(policy.jitter_sample().abs() <= policy.jitter_factor);
    }

    #[test]
    fn zero_retries_means_one_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(RetryPolicy::new().with_max_retries(3).max_attempts(), 4);
    }

    #[test]
    fn cancellation_is_never_retried() {
        let policy = RetryPolicy::new().with_retry_condition(|_| true);
        assert!(!policy.should_retry(&LlmError::Cancelled("stop".into())));
        assert!(policy.should_retry(&LlmError::InvalidInput("x".into())));
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let policy = RetryPolicy::new().with_backoff_multiplier(0.5);
        assert!(matches!(
            policy.validate(),
            Err(LlmError::ConfigurationError(_))
        ));
        assert!(RetryPolicy::new().validate().is_ok());
    }

    #[test]
    fn serde_uses_milliseconds() {
        let policy: RetryPolicy = serde_json::from_value(serde_json::json!({
            "max_retries": 5,
            "initial_delay": 250,
            "seed": 42
        }))
        .unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, crate::defaults::retry::MAX_DELAY);
        assert_eq!(policy.seed, Some(42));
    }

    proptest! {
        #[test]
        fn delays_are_monotone_and_bounded(
            seed in any::<u64>(),
            initial_ms in 1u64..2_000,
            extra_ms in 0u64..60_000,
            multiplier in 1.0f64..4.0,
            factor in 0.0f64..1.0,
        ) {
            let policy = RetryPolicy::new()
                .with_initial_delay(Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_millis(initial_ms + extra_ms))
                .with_backoff_multiplier(multiplier)
                .with_jitter_factor(factor)
                .with_seed(seed);
            let jitter = policy.jitter_sample();
            let mut previous = Duration::ZERO;
            for attempt in 0..12 {
                let delay = policy.delay_for(attempt, jitter);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= policy.max_delay);
                previous = delay;
            }
        }
    }
}
