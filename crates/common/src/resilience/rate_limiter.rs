//! Token bucket rate limiting
//!
//! Allows bursts up to a maximum capacity and refills at a fixed rate. Cloned
//! buckets share their tokens, so one bucket can govern every crawl stream in
//! the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::time::{Clock, SystemClock};

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u64,
    /// Number of tokens to refill per interval
    pub refill_amount: u64,
    /// Time interval for token refill
    pub refill_interval: Duration,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { capacity: 10, refill_amount: 1, refill_interval: Duration::from_millis(100) }
    }
}

impl TokenBucketConfig {
    /// `rate` tokens per second with bursts of up to `burst`
    pub fn per_second(rate: u32, burst: u32) -> Result<Self, String> {
        if rate == 0 {
            return Err("rate must be greater than 0".to_string());
        }
        let config = Self {
            capacity: u64::from(burst),
            refill_amount: 1,
            refill_interval: Duration::from_secs(1) / rate,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if self.refill_amount == 0 {
            return Err("refill_amount must be greater than 0".to_string());
        }
        if self.refill_interval.is_zero() {
            return Err("refill_interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Token bucket rate limiter
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use crawlsync_common::resilience::{TokenBucket, TokenBucketConfig};
///
/// let limiter = TokenBucket::new(TokenBucketConfig::per_second(5, 2).unwrap()).unwrap();
/// assert!(limiter.try_acquire(2));
/// assert!(!limiter.try_acquire(1));
/// assert!(limiter.time_until_available(1) <= Duration::from_millis(200));
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    tokens: Arc<AtomicU64>,
    last_refill: Arc<RwLock<Instant>>,
    clock: Arc<C>,
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with custom clock
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> Result<Self, String> {
        config.validate()?;

        Ok(Self {
            tokens: Arc::new(AtomicU64::new(config.capacity)),
            last_refill: Arc::new(RwLock::new(clock.now())),
            clock: Arc::new(clock),
            config,
        })
    }

    fn last_refill(&self) -> Instant {
        match self.last_refill.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("Token bucket last_refill lock poisoned");
                *poisoned.into_inner()
            }
        }
    }

    /// Refill tokens based on elapsed whole intervals
    fn refill(&self) {
        let now = self.clock.now();
        let last_refill = self.last_refill();

        let elapsed = now.saturating_duration_since(last_refill);
        let refills = elapsed.as_nanos() / self.config.refill_interval.as_nanos();

        if refills > 0 {
            let refills = u64::try_from(refills).unwrap_or(u64::MAX);
            let tokens_to_add = refills.saturating_mul(self.config.refill_amount);
            let current = self.tokens.load(Ordering::Acquire);
            let new_tokens = current.saturating_add(tokens_to_add).min(self.config.capacity);
            self.tokens.store(new_tokens, Ordering::Release);

            // Keep the partial interval so slow polling does not lose refill time
            let consumed = self
                .config
                .refill_interval
                .saturating_mul(u32::try_from(refills).unwrap_or(u32::MAX));
            if let Ok(mut guard) = self.last_refill.write() {
                *guard =
                    if new_tokens == self.config.capacity { now } else { last_refill + consumed };
            }

            debug!(tokens = new_tokens, "token bucket refilled");
        }
    }

    /// Try to acquire the specified number of tokens
    ///
    /// Returns `true` if tokens were acquired, `false` if not enough tokens
    /// available.
    pub fn try_acquire(&self, tokens: u64) -> bool {
        self.refill();

        let mut current = self.tokens.load(Ordering::Acquire);

        loop {
            if current < tokens {
                debug!(available = current, requested = tokens, "rate limit: insufficient tokens");
                return false;
            }

            match self.tokens.compare_exchange_weak(
                current,
                current - tokens,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// How long until `tokens` could be acquired, zero if they are available now
    pub fn time_until_available(&self, tokens: u64) -> Duration {
        self.refill();
        let available = self.tokens.load(Ordering::Acquire);
        if available >= tokens {
            return Duration::ZERO;
        }

        let missing = tokens.min(self.config.capacity) - available;
        let intervals = missing.div_ceil(self.config.refill_amount);
        let needed = self
            .config
            .refill_interval
            .saturating_mul(u32::try_from(intervals).unwrap_or(u32::MAX));
        let since_refill = self.clock.now().saturating_duration_since(self.last_refill());
        needed.saturating_sub(since_refill).max(Duration::from_millis(1))
    }

    /// Get the current number of available tokens
    pub fn available_tokens(&self) -> u64 {
        self.refill();
        self.tokens.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket with system clock
    pub fn new(config: TokenBucketConfig) -> Result<Self, String> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tokens: Arc::clone(&self.tokens),
            last_refill: Arc::clone(&self.last_refill),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("config", &self.config)
            .field("tokens", &self.tokens.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
