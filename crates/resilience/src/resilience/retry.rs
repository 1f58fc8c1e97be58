//! Classification-driven retry with exponential backoff and jitter
//!
//! The executor re-runs a failing operation a bounded number of times,
//! sleeping between attempts with exponentially growing, jittered delays.
//! What counts as retryable is decided by a [`RetryPolicy`]; the default
//! [`policies::Classified`] policy derives its decision from
//! [`ErrorClassification`](crate::error::ErrorClassification), so a
//! rate-limit error with a server-specified wait is honored verbatim while a
//! validation error stops the loop immediately.
//!
//! On exhaustion the caller receives the **last attempt's error unchanged**.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::{ConfigError, ConfigResult};
use crate::error::{ErrorClassification, ResilienceError};

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry with the default backoff delay
    Retry,
    /// Retry after a server-specified delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide based on the error and the 1-based attempt number that failed.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Source of delay jitter.
///
/// Injectable so tests can pin delay sequences exactly with [`NoJitter`].
pub trait JitterSource: Send + Sync {
    /// Apply jitter to a computed backoff delay.
    fn apply(&self, delay: Duration) -> Duration;
}

/// Uniform ±20% jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn apply(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.8..=1.2);
        delay.mul_f64(factor)
    }
}

/// Pass-through jitter for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn apply(&self, delay: Duration) -> Duration {
        delay
    }
}

/// Observer notified before every retry sleep.
pub trait RetryObserver: Send + Sync {
    /// `attempt` is the 1-based attempt that just failed; `delay` the sleep
    /// about to happen; `error` a rendered form of the failure.
    fn on_retry(&self, attempt: u32, delay: Duration, error: &str);
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for any single delay, including server-specified ones
    pub max_delay: Duration,
    /// Exponential growth factor between retries
    pub backoff_multiplier: f64,
    /// Per-attempt deadline, applied by [`retry_with_backoff`]
    pub timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier must be at least 1.0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid("max_delay must not be below initial_delay"));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(ConfigError::invalid("timeout must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Diagnostics from a retry run.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result; on failure, the last attempt's error unchanged.
    pub result: Result<T, E>,
    /// Attempts actually made (1-based).
    pub attempts: u32,
    /// Sum of all sleeps between attempts.
    pub total_delay: Duration,
    /// Rendered errors of every failed attempt, in order.
    pub errors: Vec<String>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// The main retry executor
pub struct RetryExecutor<P, J = ThreadRngJitter> {
    config: RetryConfig,
    policy: P,
    jitter: J,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl<P> RetryExecutor<P> {
    /// Create an executor with the given configuration and policy.
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy, jitter: ThreadRngJitter, observer: None }
    }
}

impl<P, J> RetryExecutor<P, J> {
    /// Replace the jitter source (useful for testing).
    pub fn with_jitter<J2: JitterSource>(self, jitter: J2) -> RetryExecutor<P, J2> {
        RetryExecutor {
            config: self.config,
            policy: self.policy,
            jitter,
            observer: self.observer,
        }
    }

    /// Attach a retry observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl<P, J: JitterSource> RetryExecutor<P, J> {
    /// Jittered exponential backoff for the given failed attempt (1-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw =
            self.config.initial_delay.as_secs_f64() * self.config.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.config.max_delay.as_secs_f64()).max(0.0);
        self.jitter.apply(Duration::from_secs_f64(capped))
    }

    /// Execute an operation with retry logic.
    ///
    /// Returns the success value, or the last attempt's error unchanged.
    #[instrument(skip(self, operation), fields(max_retries = self.config.max_retries))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return diagnostics.
    pub async fn execute_with_outcome<F, Fut, T, E>(
        &self,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts_allowed = self.config.max_retries + 1;
        let mut total_delay = Duration::ZERO;
        let mut errors = Vec::new();

        for attempt in 1..=attempts_allowed {
            debug!(attempt, attempts_allowed, "executing operation");

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, total_delay, errors };
                }
                Err(error) => {
                    let rendered = error.to_string();
                    errors.push(rendered.clone());

                    // No sleep after the final attempt.
                    if attempt == attempts_allowed {
                        warn!(attempt, error = %rendered, "retry attempts exhausted");
                        return RetryOutcome {
                            result: Err(error),
                            attempts: attempt,
                            total_delay,
                            errors,
                        };
                    }

                    let delay = match self.policy.should_retry(&error, attempt) {
                        RetryDecision::Stop => {
                            debug!(attempt, error = %rendered, "error not retryable, stopping");
                            return RetryOutcome {
                                result: Err(error),
                                attempts: attempt,
                                total_delay,
                                errors,
                            };
                        }
                        RetryDecision::Retry => self.backoff_delay(attempt),
                        // Server-specified waits bypass jitter but respect the cap.
                        RetryDecision::RetryAfter(requested) => {
                            requested.min(self.config.max_delay)
                        }
                    };

                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %rendered,
                        "operation failed, retrying"
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_retry(attempt, delay, &rendered);
                    }

                    tokio::time::sleep(delay).await;
                    total_delay += delay;
                }
            }
        }

        // The loop always returns from within; attempts_allowed is at least 1.
        unreachable!("retry loop exited without settling")
    }
}

/// Retry with per-attempt deadlines and classification-driven decisions.
///
/// Each attempt is wrapped in the configured per-attempt `timeout`; expiry
/// surfaces as [`ResilienceError::Timeout`] and is retryable. The
/// [`policies::Classified`] policy decides everything else.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: RetryConfig,
    context: &str,
    mut operation: F,
) -> Result<T, ResilienceError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClassification + std::error::Error + Send + Sync + 'static,
{
    let attempt_timeout = config.timeout;
    let executor = RetryExecutor::new(config, policies::Classified);
    executor
        .execute(|| {
            let fut = operation();
            let context = context.to_string();
            async move {
                match attempt_timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
                        Err(_) => Err(ResilienceError::Timeout { timeout, context }),
                    },
                    None => fut.await.map_err(|error| ResilienceError::OperationFailed { source: error }),
                }
            }
        })
        .await
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::*;

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry policy - never retries
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Classification-driven policy (the default).
    ///
    /// Retryable errors retry; a server-specified wait (rate limiting) is
    /// honored via `RetryAfter`; everything else stops.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Classified;

    impl<E: ErrorClassification> RetryPolicy<E> for Classified {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            match error.retry_after() {
                Some(wait) => RetryDecision::RetryAfter(wait),
                None => RetryDecision::Retry,
            }
        }
    }

    /// Predicate-based retry policy
    #[derive(Debug)]
    pub struct Predicate<F> {
        predicate: F,
    }

    impl<F> Predicate<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for Predicate<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the retry executor
    //!
    //! Tests cover backoff arithmetic with jitter disabled, policy decisions,
    //! attempt accounting, last-error propagation, rate-limit waits, and the
    //! per-attempt deadline of `retry_with_backoff`.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::policies::*;
    use super::*;
    use crate::error::ApiError;

    #[derive(Default)]
    struct DelayRecorder {
        delays: Mutex<Vec<Duration>>,
    }

    impl RetryObserver for DelayRecorder {
        fn on_retry(&self, _attempt: u32, delay: Duration, _error: &str) {
            if let Ok(mut delays) = self.delays.lock() {
                delays.push(delay);
            }
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(100))
            .backoff_multiplier(2.0)
            .no_timeout()
            .build()
            .unwrap()
    }

    /// Validates `RetryConfig` defaults.
    #[test]
    fn config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
    }

    /// Validates configuration validation rules.
    #[test]
    fn config_validation() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::builder().backoff_multiplier(0.5).build().is_err());
        assert!(RetryConfig::builder()
            .initial_delay(Duration::from_secs(60))
            .max_delay(Duration::from_secs(30))
            .build()
            .is_err());
        assert!(RetryConfig::builder().timeout(Duration::ZERO).build().is_err());
    }

    /// Validates the exact backoff sequence with jitter disabled.
    ///
    /// initial 10ms, multiplier 2, cap 100ms: delays are 10, 20, 40, 80,
    /// 100, 100ms for successive failed attempts.
    #[tokio::test]
    async fn backoff_sequence_without_jitter() {
        let recorder = Arc::new(DelayRecorder::default());
        let executor = RetryExecutor::new(fast_config(5), AlwaysRetry)
            .with_jitter(NoJitter)
            .with_observer(Arc::clone(&recorder) as Arc<dyn RetryObserver>);

        let result: Result<u32, &str> = executor.execute(|| async { Err("down") }).await;
        assert!(result.is_err());

        let delays = recorder.delays.lock().unwrap().clone();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
                Duration::from_millis(100),
            ]
        );
    }

    /// Validates jitter keeps delays within the ±20% envelope.
    #[test]
    fn jitter_envelope() {
        let jitter = ThreadRngJitter;
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let jittered = jitter.apply(base);
            assert!(jittered >= Duration::from_millis(80), "below -20%: {jittered:?}");
            assert!(jittered <= Duration::from_millis(120), "above +20%: {jittered:?}");
        }
        assert_eq!(jitter.apply(Duration::ZERO), Duration::ZERO);
    }

    /// Validates the executor succeeds once the operation recovers.
    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(fast_config(3), AlwaysRetry).with_jitter(NoJitter);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let outcome = executor
            .execute_with_outcome(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.ok(), Some(42));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    /// Validates exhaustion returns the last error unchanged, with
    /// `max_retries + 1` total attempts.
    #[tokio::test]
    async fn exhaustion_returns_last_error_unchanged() {
        let executor = RetryExecutor::new(fast_config(2), AlwaysRetry).with_jitter(NoJitter);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let outcome = executor
            .execute_with_outcome(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, String>(format!("failure {n}"))
                }
            })
            .await;

        assert_eq!(outcome.attempts, 3, "2 retries means 3 attempts");
        assert_eq!(outcome.result.err().as_deref(), Some("failure 2"), "last error, verbatim");
        assert_eq!(outcome.errors, vec!["failure 0", "failure 1", "failure 2"]);
    }

    /// Validates `max_retries = 0` performs a single direct attempt.
    #[tokio::test]
    async fn zero_retries_is_single_attempt() {
        let executor = RetryExecutor::new(fast_config(0), AlwaysRetry).with_jitter(NoJitter);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<u32, &str> = executor
            .execute(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Validates a non-retryable error on the first attempt propagates
    /// unchanged without any sleep.
    #[tokio::test]
    async fn non_retryable_first_attempt_propagates() {
        let executor = RetryExecutor::new(fast_config(5), Classified).with_jitter(NoJitter);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let outcome = executor
            .execute_with_outcome(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(ApiError::validation("bad input", "form.submit"))
                }
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
        let err = outcome.result.err().expect("should fail");
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Validates the classified policy honors rate-limit waits verbatim and
    /// caps them at `max_delay`.
    #[tokio::test]
    async fn rate_limit_wait_honored_then_capped() {
        let recorder = Arc::new(DelayRecorder::default());
        let executor = RetryExecutor::new(fast_config(2), Classified)
            .with_jitter(NoJitter)
            .with_observer(Arc::clone(&recorder) as Arc<dyn RetryObserver>);

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        let result: Result<u32, ApiError> = executor
            .execute(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    match c.fetch_add(1, Ordering::SeqCst) {
                        // Within the 100ms cap: honored verbatim.
                        0 => Err(ApiError::rate_limit(
                            "slow down",
                            "api",
                            Some(Duration::from_millis(30)),
                        )),
                        // Above the cap: clamped to max_delay.
                        1 => Err(ApiError::rate_limit(
                            "slow down",
                            "api",
                            Some(Duration::from_secs(9)),
                        )),
                        _ => Ok(7),
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some(7));
        let delays = recorder.delays.lock().unwrap().clone();
        assert_eq!(delays, vec![Duration::from_millis(30), Duration::from_millis(100)]);
    }

    /// Validates the predicate policy stops when the predicate rejects.
    #[tokio::test]
    async fn predicate_policy_controls_retries() {
        let policy = Predicate::new(|error: &String, attempt| {
            error.contains("retryable") && attempt < 2
        });
        let executor = RetryExecutor::new(fast_config(5), policy).with_jitter(NoJitter);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<u32, String> = executor
            .execute(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("retryable error".to_string())
                }
            })
            .await;

        assert!(result.is_err());
        // Attempts 1 and 2 retry, attempt 3's predicate check never runs
        // because attempt 2 rejects at attempt >= 2.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    /// Validates `NeverRetry` performs exactly one attempt.
    #[tokio::test]
    async fn never_retry_single_attempt() {
        let executor = RetryExecutor::new(fast_config(5), NeverRetry).with_jitter(NoJitter);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: Result<u32, &str> = executor
            .execute(|| {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// Validates `retry_with_backoff` applies the per-attempt deadline and
    /// retries the resulting timeout.
    #[tokio::test]
    async fn retry_with_backoff_applies_attempt_deadline() {
        let config = RetryConfig::builder()
            .max_retries(1)
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(50))
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        let result = retry_with_backoff(config, "slow.call", || {
            let c = Arc::clone(&counter_clone);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    // First attempt blows the 20ms deadline.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok::<u32, ApiError>(9)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(9));
        assert_eq!(counter.load(Ordering::SeqCst), 2, "timeout was retried");
    }

    /// Validates `retry_with_backoff` stops on classified non-retryable
    /// failures and yields them wrapped but unchanged.
    #[tokio::test]
    async fn retry_with_backoff_stops_on_fatal_errors() {
        let config = RetryConfig::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(5))
            .max_delay(Duration::from_millis(50))
            .no_timeout()
            .build()
            .unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        let result: Result<u32, _> = retry_with_backoff(config, "auth.call", || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ApiError::authentication("token expired", "auth.call"))
            }
        })
        .await;

        match result {
            Err(ResilienceError::OperationFailed { source }) => {
                assert_eq!(source.code(), "AUTHENTICATION_ERROR");
            }
            other => panic!("Expected OperationFailed, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
