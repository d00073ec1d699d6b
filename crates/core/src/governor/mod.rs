//! Process-wide rate governor
//!
//! Every outbound GraphQL call goes through [`RateGovernor::call`], which:
//! 1. Waits for a token from the shared bucket (request rate)
//! 2. Holds a bulkhead permit while the call is in flight (concurrency)
//! 3. Retries throttled and transient failures with jittered exponential
//!    backoff, each kind against its own attempt budget
//!
//! Unauthorized, malformed and fatal GraphQL failures are returned at once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crawlsync_common::{
    Bulkhead, BulkheadConfig, Clock, ErrorClassification, ExponentialBackoff, ResilienceError,
    Sleeper, SystemClock, TokenBucket, TokenBucketConfig, TokioSleeper,
};
use crawlsync_domain::GovernorConfig;
use tracing::{debug, error, warn};

use crate::errors::{CrawlError, TransportError, TransportErrorKind};

pub struct RateGovernor {
    bucket: TokenBucket<Arc<dyn Clock>>,
    bulkhead: Bulkhead,
    backoff: ExponentialBackoff,
    max_attempts: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl RateGovernor {
    /// Governor on the system clock, sleeping with tokio
    pub fn new(config: &GovernorConfig) -> Result<Self, CrawlError> {
        Self::with_runtime(config, Arc::new(SystemClock), Arc::new(TokioSleeper))
    }

    /// Governor with injected time, for deterministic tests
    pub fn with_runtime(
        config: &GovernorConfig,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, CrawlError> {
        let bucket_config = TokenBucketConfig::per_second(config.requests_per_second, config.burst)
            .map_err(ResilienceError::Config)?;
        let bucket =
            TokenBucket::with_clock(bucket_config, clock).map_err(ResilienceError::Config)?;
        let bulkhead = Bulkhead::new(BulkheadConfig::new(config.max_concurrent))?;
        let backoff = ExponentialBackoff::new(config.base_delay(), config.max_delay())
            .map_err(ResilienceError::Config)?;
        if config.max_attempts == 0 {
            return Err(ResilienceError::Config("max_attempts must be > 0".into()).into());
        }

        Ok(Self { bucket, bulkhead, backoff, max_attempts: config.max_attempts, sleeper })
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    /// Run `operation` under the rate and concurrency limits, retrying
    /// throttled and transient failures.
    ///
    /// `operation` is invoked at most `max_attempts` times per failure kind.
    ///
    /// # Errors
    /// [`CrawlError::RetriesExhausted`] once a budget runs out, or the
    /// operation's own error when it is not retryable.
    pub async fn call<T, F, Fut>(&self, mut operation: F) -> Result<T, CrawlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut throttled = 0u32;
        let mut transient = 0u32;

        loop {
            self.wait_for_token().await;
            let permit = self.bulkhead.acquire().await?;
            let result = operation().await;
            drop(permit);

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err.into());
            }
            // Throttling has its own budget; every other retryable kind shares one
            let kind = err.kind();
            let failures = if kind == TransportErrorKind::Throttled {
                throttled += 1;
                throttled
            } else {
                transient += 1;
                transient
            };

            if failures >= self.max_attempts {
                error!(
                    kind = %kind,
                    attempts = failures,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(CrawlError::RetriesExhausted {
                    kind,
                    attempts: failures,
                    last: Box::new(err),
                });
            }

            let delay = self.retry_delay(failures - 1, &err);
            warn!(
                kind = %kind,
                attempt = failures,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying after backoff"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    /// Jittered backoff, stretched to honour a server-provided retry-after
    /// (capped at the maximum delay).
    fn retry_delay(&self, attempt: u32, err: &TransportError) -> Duration {
        let delay = self.backoff.delay(attempt);
        match err {
            TransportError::Throttled { retry_after: Some(after) } => {
                delay.max((*after).min(self.backoff.max()))
            }
            _ => delay,
        }
    }

    async fn wait_for_token(&self) {
        while !self.bucket.try_acquire(1) {
            let wait = self.bucket.time_until_available(1);
            debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "rate limited");
            self.sleeper.sleep(wait).await;
        }
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("bucket", &self.bucket)
            .field("bulkhead", &self.bulkhead)
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crawlsync_common::testing::{MockClock, RecordingSleeper};
    use crawlsync_domain::GraphqlError;

    use super::*;

    fn config() -> GovernorConfig {
        GovernorConfig {
            requests_per_second: 100,
            burst: 100,
            max_concurrent: 2,
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }

    fn governor(config: &GovernorConfig) -> (RateGovernor, RecordingSleeper) {
        let clock = MockClock::new();
        let sleeper = RecordingSleeper::with_clock(clock.clone());
        let governor =
            RateGovernor::with_runtime(config, Arc::new(clock), Arc::new(sleeper.clone())).unwrap();
        (governor, sleeper)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let (governor, sleeper) = governor(&config());
        let value = governor.call(|| async { Ok::<_, TransportError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let (governor, sleeper) = governor(&config());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let value = governor
            .call(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TransportError::transient("503"))
                } else {
                    Ok("page")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.count(), 2);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let (governor, sleeper) = governor(&config());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = governor
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransportError::unauthorized("expired"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Transport(TransportError::Unauthorized { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_stretches_delay() {
        let (governor, sleeper) = governor(&config());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        governor
            .call(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TransportError::Throttled { retry_after: Some(Duration::from_secs(60)) })
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        // Capped at max_delay since the jittered base is at most 150ms
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_budgets_are_per_kind() {
        let (governor, _sleeper) = governor(&config());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        // 4 throttles then 4 transients stay inside both budgets
        let value = governor
            .call(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                match n {
                    0..=3 => Err(TransportError::Throttled { retry_after: None }),
                    4..=7 => Err(TransportError::transient("reset")),
                    _ => Ok(n),
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 8);
    }

    #[tokio::test]
    async fn test_graphql_errors_retry_only_when_flagged() {
        let (governor, _sleeper) = governor(&config());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let value = governor
            .call(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let errors = vec![GraphqlError::new("upstream busy")];
                    Err(TransportError::GraphQl { errors, retryable: true })
                } else {
                    Ok("page")
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "page");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let rejected = TransportError::GraphQl {
            errors: vec![GraphqlError::new("unknown field")],
            retryable: false,
        };
        assert!(!rejected.is_retryable());
        let rejected = &rejected;
        let err = governor
            .call(move || async move { Err::<(), _>(rejected.clone()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Transport(TransportError::GraphQl { .. })));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_reports_error_kind() {
        let (governor, _sleeper) = governor(&config());

        let err = governor
            .call(|| async {
                let errors = vec![GraphqlError::new("upstream busy")];
                Err::<(), _>(TransportError::GraphQl { errors, retryable: true })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CrawlError::RetriesExhausted { kind: TransportErrorKind::GraphQl, attempts: 5, .. }
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new());
        let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());
        let bad = GovernorConfig { max_attempts: 0, ..config() };
        assert!(RateGovernor::with_runtime(&bad, clock.clone(), sleeper.clone()).is_err());
        let bad = GovernorConfig { requests_per_second: 0, ..config() };
        assert!(RateGovernor::with_runtime(&bad, clock, sleeper).is_err());
    }
}
