//! Backoff delay calculation with exponential growth, ceiling, and jitter
//!
//! This module provides [`BackoffCalculator`], a reusable primitive for
//! computing retry delays. It is available to connector sync operations for
//! their own internal pacing; the scheduler's reconnect escalation uses a
//! separate curve (base 1.5, keyed off failed sync cycles) and does not go
//! through this type.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Calculator mapping an attempt number to a delay
///
/// Pure aside from the thread RNG used for jitter: the same inputs produce
/// the same distribution, not the same value.
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    /// Create a new calculator with the given configuration
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Create a calculator with default configuration
    pub fn with_defaults() -> Self {
        Self::new(BackoffConfig::default())
    }

    /// Compute the delay for a given attempt number
    ///
    /// At or beyond `max_retries` the delay pins to `max_delay_ms`
    /// (permanently at ceiling, not an error). Below that it grows as
    /// `base_interval_ms * exponential_base^attempt`, capped at the ceiling.
    /// With jitter enabled the capped value is perturbed uniformly within
    /// +/-25% and clamped to be non-negative.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt >= self.config.max_retries {
            return Duration::from_millis(self.config.max_delay_ms);
        }

        let exponential =
            self.config.base_interval_ms as f64 * self.config.exponential_base.powi(attempt as i32);
        let capped = exponential.min(self.config.max_delay_ms as f64);

        let delay = if self.config.use_jitter {
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Whether another attempt should be made after `attempt` attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_retries
    }

    /// Get the backoff configuration
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64, max_retries: u32, exp: f64, max_ms: u64, jitter: bool) -> BackoffConfig {
        BackoffConfig {
            base_interval_ms: base_ms,
            max_retries,
            exponential_base: exp,
            max_delay_ms: max_ms,
            use_jitter: jitter,
        }
    }

    // Test 1: Exponential growth without jitter
    #[test]
    fn test_exponential_growth() {
        let calc = BackoffCalculator::new(config(1000, 10, 2.0, 300_000, false));

        assert_eq!(calc.delay(0), Duration::from_millis(1000));
        assert_eq!(calc.delay(1), Duration::from_millis(2000));
        assert_eq!(calc.delay(2), Duration::from_millis(4000));
        assert_eq!(calc.delay(3), Duration::from_millis(8000));
    }

    // Test 2: Delays strictly increase with attempt until capped
    #[test]
    fn test_strictly_increasing_until_cap() {
        let calc = BackoffCalculator::new(config(1000, 20, 2.0, 60_000, false));

        let mut previous = Duration::ZERO;
        for attempt in 0..6 {
            let delay = calc.delay(attempt);
            assert!(
                delay > previous,
                "delay({}) = {:?} should exceed {:?}",
                attempt,
                delay,
                previous
            );
            previous = delay;
        }
        // 1000 * 2^6 = 64000, capped at 60000
        assert_eq!(calc.delay(6), Duration::from_millis(60_000));
        assert_eq!(calc.delay(7), Duration::from_millis(60_000));
    }

    // Test 3: At or beyond max_retries the delay is the ceiling
    #[test]
    fn test_ceiling_at_max_retries() {
        let calc = BackoffCalculator::new(config(1000, 5, 2.0, 300_000, false));

        assert_eq!(calc.delay(5), Duration::from_millis(300_000));
        assert_eq!(calc.delay(6), Duration::from_millis(300_000));
        assert_eq!(calc.delay(100), Duration::from_millis(300_000));
    }

    // Test 4: Jitter stays within +/-25% of the unjittered value
    #[test]
    fn test_jitter_within_range() {
        let calc = BackoffCalculator::new(config(10_000, 10, 2.0, 300_000, true));

        for _ in 0..100 {
            let delay = calc.delay(0);
            // Without jitter: 10 seconds. With jitter: 7.5 - 12.5 seconds.
            assert!(
                delay >= Duration::from_millis(7500) && delay <= Duration::from_millis(12_500),
                "Delay {:?} outside jitter range",
                delay
            );
        }
    }

    // Test 5: Jittered delay is never negative, even for tiny bases
    #[test]
    fn test_jitter_never_negative() {
        let calc = BackoffCalculator::new(config(1, 10, 2.0, 300_000, true));

        for attempt in 0..10 {
            // Duration construction would panic on a negative value; also
            // sanity-check the magnitude.
            let delay = calc.delay(attempt);
            assert!(delay <= Duration::from_millis(400_000));
        }
    }

    // Test 6: should_retry is attempt < max_retries
    #[test]
    fn test_should_retry() {
        let calc = BackoffCalculator::new(config(1000, 3, 2.0, 300_000, false));

        assert!(calc.should_retry(0));
        assert!(calc.should_retry(2));
        assert!(!calc.should_retry(3));
        assert!(!calc.should_retry(10));
    }

    // Test 7: Defaults match the documented configuration
    #[test]
    fn test_default_configuration() {
        let calc = BackoffCalculator::with_defaults();
        let config = calc.config();

        assert_eq!(config.base_interval_ms, 5000);
        assert_eq!(config.max_retries, 10);
        assert!((config.exponential_base - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_delay_ms, 300_000);
        assert!(config.use_jitter);
    }
}
