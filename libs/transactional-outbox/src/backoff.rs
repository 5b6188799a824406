//! Jittered exponential backoff for the publisher's retry schedule.
//!
//! `delay(n) = min(base * multiplier^n, max) * jitter_factor`, where
//! `jitter_factor` is drawn uniformly from `[1 - jitter, 1 + jitter]` — except
//! at `n == 0`, which always returns `base` exactly so callers can assert a
//! deterministic first-retry delay.
//!
//! The RNG is injected rather than pulled from a global, so a test can seed
//! it and a production caller can hand it a real source of entropy without
//! this module owning any shared mutable state.

use rand::{Rng, RngCore};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

pub struct BackoffStrategy<R: RngCore + Send> {
    config: BackoffConfig,
    rng: Mutex<R>,
}

impl<R: RngCore + Send> BackoffStrategy<R> {
    pub fn new(config: BackoffConfig, rng: R) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Delay before the `retries`-th retry attempt (0-indexed: `retries == 0`
    /// is the delay before the first retry).
    pub fn compute(&self, retries: u32) -> Duration {
        if retries == 0 {
            return self.config.base_delay;
        }

        let unjittered = self.config.base_delay.as_secs_f64()
            * self.config.multiplier.powi(retries as i32);
        let capped = unjittered.min(self.config.max_delay.as_secs_f64());

        let jitter_factor = {
            let mut rng = self.rng.lock().expect("backoff rng mutex poisoned");
            rng.gen_range((1.0 - self.config.jitter)..=(1.0 + self.config.jitter))
        };

        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn strategy() -> BackoffStrategy<StdRng> {
        BackoffStrategy::new(BackoffConfig::default(), StdRng::seed_from_u64(42))
    }

    #[test]
    fn zero_retries_returns_base_delay_exactly() {
        let strategy = strategy();
        assert_eq!(strategy.compute(0), Duration::from_secs(1));
    }

    #[test]
    fn delay_stays_within_jitter_bounds_of_cap() {
        let config = BackoffConfig::default();
        let strategy = BackoffStrategy::new(config.clone(), StdRng::seed_from_u64(7));

        for retries in 1..20 {
            let delay = strategy.compute(retries).as_secs_f64();
            let lower = config.base_delay.as_secs_f64() * (1.0 - config.jitter);
            let upper = config.max_delay.as_secs_f64() * (1.0 + config.jitter);
            assert!(
                delay >= lower - f64::EPSILON && delay <= upper + f64::EPSILON,
                "retries={retries} delay={delay} not in [{lower}, {upper}]"
            );
        }
    }

    #[test]
    fn delay_grows_with_retry_count_before_the_cap() {
        let strategy = strategy();
        let d1 = strategy.compute(1).as_secs_f64();
        let d2 = strategy.compute(2).as_secs_f64();
        assert!(d2 > d1 * 1.2, "expected roughly exponential growth, got {d1} then {d2}");
    }
}
