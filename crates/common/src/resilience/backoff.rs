//! Exponential backoff with multiplicative jitter
//!
//! `delay(attempt) = min(max_delay, base * 2^attempt) * factor`, where
//! `factor` is drawn uniformly from `[0.5, 1.5]`. The math is pure so callers
//! can test it without sleeping.

use std::time::Duration;

use rand::Rng;

/// Default base delay between retries
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound on the un-jittered delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Lower bound of the jitter factor
pub const JITTER_MIN: f64 = 0.5;

/// Upper bound of the jitter factor
pub const JITTER_MAX: f64 = 1.5;

/// Exponent cap; 2^30 already saturates any practical `max_delay`
const MAX_EXPONENT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self { base: DEFAULT_BASE_DELAY, max: DEFAULT_MAX_DELAY }
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Result<Self, String> {
        if base > max {
            return Err("base delay must not exceed max delay".to_string());
        }
        Ok(Self { base, max })
    }

    pub const fn base(&self) -> Duration {
        self.base
    }

    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Delay before jitter: `min(max, base * 2^attempt)`
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(MAX_EXPONENT);
        self.base.saturating_mul(multiplier).min(self.max)
    }

    /// Delay for `attempt` scaled by an explicit jitter factor
    pub fn delay_with_factor(&self, attempt: u32, factor: f64) -> Duration {
        let factor = factor.clamp(JITTER_MIN, JITTER_MAX);
        self.capped_delay(attempt).mul_f64(factor)
    }

    /// Jittered delay for `attempt` using `rng`
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.delay_with_factor(attempt, rng.gen_range(JITTER_MIN..=JITTER_MAX))
    }

    /// Jittered delay for `attempt` using the thread-local generator
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Smallest and largest possible delay for `attempt`
    pub fn bounds(&self, attempt: u32) -> (Duration, Duration) {
        let capped = self.capped_delay(attempt);
        (capped.mul_f64(JITTER_MIN), capped.mul_f64(JITTER_MAX))
    }
}
