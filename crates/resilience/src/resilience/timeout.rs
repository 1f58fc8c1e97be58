//! Timeout wrappers for remote operations
//!
//! Deadline enforcement around futures: a plain [`deadline`] race, an
//! [`abortable`] variant with external cancellation, progress reporting,
//! shared-deadline races and per-item batch deadlines, plus an
//! [`AdaptiveTimeout`] that derives its deadline from observed latencies.
//!
//! On expiry the guarded future is dropped; a call settles exactly once.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Clock, ConfigError, ConfigResult, SystemClock};
use crate::error::ResilienceError;

/// Broad timeout categories for common operation shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Cheap lookups and cache hits.
    Quick,
    /// Typical CRUD round trip.
    Normal,
    /// Heavier queries and aggregations.
    Slow,
    /// Report generation, large transfers.
    VerySlow,
    /// Batch and housekeeping work.
    Background,
}

impl TimeoutClass {
    /// The deadline associated with this class.
    pub fn duration(self) -> Duration {
        match self {
            Self::Quick => Duration::from_secs(2),
            Self::Normal => Duration::from_secs(10),
            Self::Slow => Duration::from_secs(30),
            Self::VerySlow => Duration::from_secs(60),
            Self::Background => Duration::from_secs(120),
        }
    }
}

/// Run `fut` under a deadline.
///
/// Returns the future's own result (errors wrapped as `OperationFailed`), or
/// [`ResilienceError::Timeout`] once `timeout` elapses. The losing side is
/// dropped, so the call settles exactly once.
pub async fn deadline<Fut, T, E>(
    fut: Fut,
    timeout: Duration,
    context: &str,
) -> Result<T, ResilienceError<E>>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
        Err(_) => {
            warn!(context, timeout_ms = timeout.as_millis() as u64, "operation deadline expired");
            Err(ResilienceError::Timeout { timeout, context: context.to_string() })
        }
    }
}

/// Handle for aborting an in-flight [`abortable`] operation.
///
/// `abort()` is idempotent; aborting after settlement has no effect.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    /// Cancel the guarded operation. Behaves exactly like deadline expiry.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Whether `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run `fut` under a deadline with an external abort handle.
///
/// The returned future behaves like [`deadline`]; additionally the
/// [`AbortHandle`] can cut the operation short at any point, surfacing the
/// same `Timeout` error as a natural expiry.
pub fn abortable<Fut, T, E>(
    fut: Fut,
    timeout: Duration,
    context: &str,
) -> (impl Future<Output = Result<T, ResilienceError<E>>>, AbortHandle)
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let token = CancellationToken::new();
    let handle = AbortHandle { token: token.clone() };
    let context = context.to_string();

    let guarded = async move {
        tokio::select! {
            result = tokio::time::timeout(timeout, fut) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
                Err(_) => {
                    warn!(context = %context, "operation deadline expired");
                    Err(ResilienceError::Timeout { timeout, context })
                }
            },
            () = token.cancelled() => {
                debug!(context = %context, "operation aborted");
                Err(ResilienceError::Timeout { timeout, context })
            }
        }
    };

    (guarded, handle)
}

/// Run `fut` under a deadline while reporting elapsed time on a fixed tick.
///
/// `on_progress` receives the elapsed duration at each `interval`. The
/// deadline contract is identical to [`deadline`].
pub async fn with_progress<Fut, T, E, P>(
    fut: Fut,
    timeout: Duration,
    context: &str,
    interval: Duration,
    mut on_progress: P,
) -> Result<T, ResilienceError<E>>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    P: FnMut(Duration),
{
    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; skip it so progress starts after one interval.
    ticker.tick().await;

    let mut fut = std::pin::pin!(tokio::time::timeout(timeout, fut));

    loop {
        tokio::select! {
            result = &mut fut => {
                return match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
                    Err(_) => Err(ResilienceError::Timeout {
                        timeout,
                        context: context.to_string(),
                    }),
                };
            }
            _ = ticker.tick() => {
                on_progress(started.elapsed());
            }
        }
    }
}

/// Race several futures under one shared deadline; first settlement wins.
///
/// The remaining futures are dropped. An empty input times out immediately.
pub async fn race<Fut, T, E>(
    futures: Vec<Fut>,
    timeout: Duration,
    context: &str,
) -> Result<T, ResilienceError<E>>
where
    Fut: Future<Output = Result<T, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    if futures.is_empty() {
        return Err(ResilienceError::Timeout { timeout, context: context.to_string() });
    }
    match tokio::time::timeout(timeout, futures::future::select_all(futures)).await {
        Ok((Ok(value), _, _)) => Ok(value),
        Ok((Err(error), _, _)) => Err(ResilienceError::OperationFailed { source: error }),
        Err(_) => Err(ResilienceError::Timeout { timeout, context: context.to_string() }),
    }
}

/// Run a batch of futures concurrently, each with its own deadline.
///
/// Returns one result per input, in input order.
pub async fn all<Fut, T, E>(
    items: Vec<(Fut, Duration)>,
    context: &str,
) -> Vec<Result<T, ResilienceError<E>>>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let wrapped = items.into_iter().map(|(fut, timeout)| deadline(fut, timeout, context));
    futures::future::join_all(wrapped).await
}

/// Configuration for [`AdaptiveTimeout`].
#[derive(Debug, Clone)]
pub struct AdaptiveTimeoutConfig {
    /// Floor for the computed deadline.
    pub min_timeout: Duration,
    /// Ceiling for the computed deadline, also used while no samples exist.
    pub max_timeout: Duration,
    /// Standard deviations added on top of the mean latency.
    pub multiplier: f64,
    /// Capacity of the latency sample window.
    pub max_samples: usize,
}

impl Default for AdaptiveTimeoutConfig {
    fn default() -> Self {
        Self {
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(30),
            multiplier: 2.0,
            max_samples: 50,
        }
    }
}

impl AdaptiveTimeoutConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_timeout > self.max_timeout {
            return Err(ConfigError::invalid("min_timeout must not exceed max_timeout"));
        }
        if self.multiplier <= 0.0 {
            return Err(ConfigError::invalid("multiplier must be greater than 0"));
        }
        if self.max_samples == 0 {
            return Err(ConfigError::invalid("max_samples must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SampleWindow {
    samples: VecDeque<Duration>,
}

impl SampleWindow {
    fn record(&mut self, sample: Duration, cap: usize) {
        if self.samples.len() == cap {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

/// Deadline estimator that tracks observed latencies per resource.
///
/// Computes `clamp(mean + multiplier * stddev, min, max)` over a bounded FIFO
/// of recent completion times. Timed-out calls are excluded from the window
/// so one slow spell cannot inflate future deadlines unboundedly.
///
/// Intended to be long-lived and shared (one instance per resource); every
/// mutation is a single synchronous critical section.
pub struct AdaptiveTimeout<C: Clock = SystemClock> {
    config: AdaptiveTimeoutConfig,
    window: Mutex<SampleWindow>,
    clock: Arc<C>,
}

impl AdaptiveTimeout<SystemClock> {
    /// Create an estimator with the given configuration using system time.
    pub fn new(config: AdaptiveTimeoutConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> AdaptiveTimeout<C> {
    /// Create an estimator with a custom clock (useful for testing).
    pub fn with_clock(config: AdaptiveTimeoutConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            window: Mutex::new(SampleWindow { samples: VecDeque::new() }),
            clock: Arc::new(clock),
        })
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, SampleWindow> {
        match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("adaptive timeout window lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Record an observed completion time.
    pub fn record(&self, sample: Duration) {
        self.lock_window().record(sample, self.config.max_samples);
    }

    /// Compute the deadline from the current window.
    ///
    /// Returns `max_timeout` while no samples have been recorded.
    pub fn calculate_timeout(&self) -> Duration {
        let window = self.lock_window();
        if window.samples.is_empty() {
            return self.config.max_timeout;
        }

        let n = window.samples.len() as f64;
        let mean = window.samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / n;
        let variance =
            window.samples.iter().map(|d| (d.as_secs_f64() - mean).powi(2)).sum::<f64>() / n;
        let estimate = mean + self.config.multiplier * variance.sqrt();

        Duration::from_secs_f64(
            estimate
                .clamp(self.config.min_timeout.as_secs_f64(), self.config.max_timeout.as_secs_f64()),
        )
    }

    /// The deadline the next `execute` call would use.
    pub fn current_timeout(&self) -> Duration {
        self.calculate_timeout()
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.lock_window().samples.len()
    }

    /// Clear the sample window.
    pub fn reset(&self) {
        self.lock_window().samples.clear();
        debug!("adaptive timeout window reset");
    }

    /// Run the operation under the currently computed deadline.
    ///
    /// Non-timeout completions (success or operation failure) feed the
    /// window; expiries do not.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation: F,
        context: &str,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let timeout = self.calculate_timeout();
        let started = self.clock.now();

        match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => {
                let elapsed = self.clock.now().duration_since(started);
                self.record(elapsed);
                match result {
                    Ok(value) => Ok(value),
                    Err(error) => Err(ResilienceError::OperationFailed { source: error }),
                }
            }
            Err(_) => {
                warn!(
                    context,
                    timeout_ms = timeout.as_millis() as u64,
                    "adaptive deadline expired"
                );
                Err(ResilienceError::Timeout { timeout, context: context.to_string() })
            }
        }
    }
}

impl<C: Clock> std::fmt::Debug for AdaptiveTimeout<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveTimeout")
            .field("config", &self.config)
            .field("samples", &self.sample_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for timeout wrappers
    //!
    //! Tests cover deadline expiry, pass-through of success and failure,
    //! abort semantics, progress reporting, batch deadlines, and the adaptive
    //! estimator's window arithmetic.

    use std::convert::Infallible;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct TestError(&'static str);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    /// Validates `deadline` passes a fast success through unchanged.
    #[tokio::test]
    async fn deadline_passes_through_success() {
        let result: Result<u32, ResilienceError<TestError>> =
            deadline(async { Ok(42) }, Duration::from_secs(1), "fast-op").await;
        assert_eq!(result.ok(), Some(42));
    }

    /// Validates `deadline` wraps an operation failure and keeps the source.
    #[tokio::test]
    async fn deadline_wraps_operation_failure() {
        let result: Result<u32, ResilienceError<TestError>> =
            deadline(async { Err(TestError("boom")) }, Duration::from_secs(1), "op").await;
        match result {
            Err(ResilienceError::OperationFailed { source }) => assert_eq!(source, TestError("boom")),
            other => panic!("Expected OperationFailed, got {other:?}"),
        }
    }

    /// Validates expiry produces a `Timeout` carrying deadline and context.
    #[tokio::test]
    async fn deadline_expiry_produces_timeout() {
        let result: Result<u32, ResilienceError<TestError>> = deadline(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            },
            Duration::from_millis(10),
            "slow-op",
        )
        .await;

        match result {
            Err(ResilienceError::Timeout { timeout, context }) => {
                assert_eq!(timeout, Duration::from_millis(10));
                assert_eq!(context, "slow-op");
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    /// Validates `abort()` settles the operation like a deadline expiry and
    /// stays idempotent.
    #[tokio::test]
    async fn abortable_abort_behaves_like_expiry() {
        let (fut, handle) = abortable::<_, u32, TestError>(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            },
            Duration::from_secs(10),
            "aborted-op",
        );

        handle.abort();
        handle.abort(); // idempotent
        assert!(handle.is_aborted());

        match fut.await {
            Err(ResilienceError::Timeout { context, .. }) => assert_eq!(context, "aborted-op"),
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    /// Validates an abortable operation that settles first ignores the handle.
    #[tokio::test]
    async fn abortable_success_wins_over_later_abort() {
        let (fut, handle) = abortable::<_, u32, TestError>(
            async { Ok(7) },
            Duration::from_secs(1),
            "quick-op",
        );
        let result = fut.await;
        handle.abort();
        assert_eq!(result.ok(), Some(7));
    }

    /// Validates progress callbacks fire while the deadline is still enforced.
    #[tokio::test]
    async fn with_progress_reports_and_enforces_deadline() {
        let mut ticks = 0u32;
        let result: Result<u32, ResilienceError<TestError>> = with_progress(
            async {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(5)
            },
            Duration::from_secs(1),
            "op",
            Duration::from_millis(20),
            |_elapsed| ticks += 1,
        )
        .await;

        assert_eq!(result.ok(), Some(5));
        assert!(ticks >= 2, "expected at least two progress ticks, got {ticks}");

        let mut late_ticks = 0u32;
        let result: Result<u32, ResilienceError<TestError>> = with_progress(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(5)
            },
            Duration::from_millis(50),
            "op",
            Duration::from_millis(10),
            |_elapsed| late_ticks += 1,
        )
        .await;
        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
        assert!(late_ticks >= 1, "progress should tick before the deadline expires");
    }

    /// Validates `race` yields the first settlement and drops the rest.
    #[tokio::test]
    async fn race_first_settlement_wins() {
        let slow: std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>>>> =
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<u32, TestError>(1)
            });
        let fast: std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>>>> =
            Box::pin(async { Ok::<u32, TestError>(2) });

        let result = race(vec![slow, fast], Duration::from_secs(1), "race-op").await;
        assert_eq!(result.ok(), Some(2));
    }

    /// Validates `all` applies an individual deadline to each batch entry.
    #[tokio::test]
    async fn all_applies_per_item_deadlines() {
        let fast: std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>>>> =
            Box::pin(async { Ok::<u32, TestError>(1) });
        let slow: std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>>>> =
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<u32, TestError>(2)
            });

        let results = all(
            vec![(fast, Duration::from_secs(1)), (slow, Duration::from_millis(10))],
            "batch-op",
        )
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().ok(), Some(&1));
        assert!(matches!(results[1], Err(ResilienceError::Timeout { .. })));
    }

    /// Validates timeout class presets.
    #[test]
    fn timeout_class_durations() {
        assert_eq!(TimeoutClass::Quick.duration(), Duration::from_secs(2));
        assert_eq!(TimeoutClass::Normal.duration(), Duration::from_secs(10));
        assert_eq!(TimeoutClass::Slow.duration(), Duration::from_secs(30));
        assert_eq!(TimeoutClass::VerySlow.duration(), Duration::from_secs(60));
        assert_eq!(TimeoutClass::Background.duration(), Duration::from_secs(120));
    }

    /// Validates `AdaptiveTimeoutConfig` validation rules.
    #[test]
    fn adaptive_config_validation() {
        assert!(AdaptiveTimeoutConfig::default().validate().is_ok());

        let config = AdaptiveTimeoutConfig {
            min_timeout: Duration::from_secs(60),
            ..AdaptiveTimeoutConfig::default()
        };
        assert!(config.validate().is_err(), "min above max should fail");

        let config = AdaptiveTimeoutConfig { multiplier: 0.0, ..AdaptiveTimeoutConfig::default() };
        assert!(config.validate().is_err());

        let config = AdaptiveTimeoutConfig { max_samples: 0, ..AdaptiveTimeoutConfig::default() };
        assert!(config.validate().is_err());
    }

    /// Validates the estimator returns `max_timeout` with an empty window.
    #[test]
    fn adaptive_empty_window_uses_max() {
        let adaptive = AdaptiveTimeout::new(AdaptiveTimeoutConfig::default()).unwrap();
        assert_eq!(adaptive.calculate_timeout(), Duration::from_secs(30));
    }

    /// Validates the mean + multiplier*stddev formula with a known window.
    ///
    /// Samples 2s and 4s: mean 3s, population stddev 1s, multiplier 2.0 →
    /// estimate 5s, inside the [1s, 30s] clamp.
    #[test]
    fn adaptive_formula_matches_known_window() {
        let adaptive = AdaptiveTimeout::new(AdaptiveTimeoutConfig::default()).unwrap();
        adaptive.record(Duration::from_secs(2));
        adaptive.record(Duration::from_secs(4));

        let timeout = adaptive.calculate_timeout();
        let expected = Duration::from_secs(5);
        let diff = timeout.abs_diff(expected);
        assert!(diff < Duration::from_millis(1), "expected ~5s, got {timeout:?}");
    }

    /// Validates the clamp floor when observed latencies are tiny.
    #[test]
    fn adaptive_clamps_to_min() {
        let adaptive = AdaptiveTimeout::new(AdaptiveTimeoutConfig::default()).unwrap();
        adaptive.record(Duration::from_millis(5));
        adaptive.record(Duration::from_millis(5));
        assert_eq!(adaptive.calculate_timeout(), Duration::from_secs(1));
    }

    /// Validates the window evicts oldest samples past `max_samples`.
    #[test]
    fn adaptive_window_is_bounded() {
        let config = AdaptiveTimeoutConfig { max_samples: 3, ..AdaptiveTimeoutConfig::default() };
        let adaptive = AdaptiveTimeout::new(config).unwrap();
        for i in 1..=5u64 {
            adaptive.record(Duration::from_secs(i));
        }
        assert_eq!(adaptive.sample_count(), 3);
        // Window now holds 3s, 4s, 5s: mean 4s, stddev ~0.8165s, estimate
        // ~5.633s.
        let timeout = adaptive.calculate_timeout();
        assert!(timeout > Duration::from_secs(5) && timeout < Duration::from_secs(6));
    }

    /// Validates `execute` records successes and failures but not expiries.
    #[tokio::test]
    async fn adaptive_execute_records_non_timeout_completions() {
        let config = AdaptiveTimeoutConfig {
            min_timeout: Duration::from_millis(10),
            max_timeout: Duration::from_millis(50),
            ..AdaptiveTimeoutConfig::default()
        };
        let adaptive = AdaptiveTimeout::new(config).unwrap();

        let ok: Result<u32, ResilienceError<TestError>> =
            adaptive.execute(|| async { Ok(1) }, "op").await;
        assert!(ok.is_ok());
        assert_eq!(adaptive.sample_count(), 1);

        let failed: Result<u32, ResilienceError<TestError>> =
            adaptive.execute(|| async { Err(TestError("boom")) }, "op").await;
        assert!(failed.is_err());
        assert_eq!(adaptive.sample_count(), 2, "operation failures still feed the window");

        let timed_out: Result<u32, ResilienceError<Infallible>> = adaptive
            .execute(
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                },
                "op",
            )
            .await;
        assert!(matches!(timed_out, Err(ResilienceError::Timeout { .. })));
        assert_eq!(adaptive.sample_count(), 2, "expiries are excluded from the window");
    }

    /// Validates `reset` empties the window and restores the max deadline.
    #[test]
    fn adaptive_reset_clears_window() {
        let adaptive = AdaptiveTimeout::new(AdaptiveTimeoutConfig::default()).unwrap();
        adaptive.record(Duration::from_secs(2));
        adaptive.reset();
        assert_eq!(adaptive.sample_count(), 0);
        assert_eq!(adaptive.calculate_timeout(), Duration::from_secs(30));
    }
}
