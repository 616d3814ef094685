//! Exponential backoff with jitter

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Share of the computed delay added as random jitter (0..=10%).
pub const JITTER_RATIO: f64 = 0.1;

/// Retry policy applied to each provider in a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; each provider gets `max_retries + 1` calls.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// A policy that never sleeps. Useful for tests and benchmarks.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Total calls one provider may receive.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `min(base_delay * multiplier^attempt, max_delay)`, without jitter.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Add up to [`JITTER_RATIO`] of `delay` drawn from `rng`.
    pub fn with_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
        let ratio = rng.gen_range(0.0..=JITTER_RATIO);
        delay + delay.mul_f64(ratio)
    }

    /// Jittered delay before retrying after `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Self::with_jitter(self.delay_for(attempt), &mut rand::thread_rng())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::mock::StepRng;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn delay_grows_exponentially() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(1), Duration::from_millis(2000));
        assert_eq!(p.delay_for(2), Duration::from_millis(4000));
        assert_eq!(p.delay_for(3), Duration::from_millis(8000));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(p.delay_for(1000), Duration::from_millis(30_000));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn zero_jitter_leaves_delay_unchanged() {
        let mut rng = StepRng::new(0, 0);
        let delay = Duration::from_millis(1000);
        assert_eq!(RetryPolicy::with_jitter(delay, &mut rng), delay);
    }

    #[test]
    fn max_attempts_counts_first_call() {
        assert_eq!(policy().max_attempts(), 4);
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }

    #[test]
    fn from_config() {
        let p = RetryPolicy::from(&RetryConfig {
            max_retries: 1,
            base_delay_ms: 250,
            max_delay_ms: 1000,
            backoff_multiplier: 3.0,
        });
        assert_eq!(p.max_retries, 1);
        assert_eq!(p.delay_for(1), Duration::from_millis(750));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
    }

    proptest! {
        #[test]
        fn prop_backoff_within_jitter_bounds(
            attempt in 0u32..64,
            base_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
            multiplier in 1.0f64..4.0,
        ) {
            let p = RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(base_ms + extra_ms),
                backoff_multiplier: multiplier,
            };
            let delay = p.delay_for(attempt);
            prop_assert!(delay <= p.max_delay);

            let jittered = p.backoff(attempt);
            prop_assert!(jittered >= delay);
            prop_assert!(jittered <= delay + delay.mul_f64(JITTER_RATIO) + Duration::from_nanos(1));
        }
    }
}
