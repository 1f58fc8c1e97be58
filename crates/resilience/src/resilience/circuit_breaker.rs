//! Circuit breaker for per-resource failure isolation
//!
//! One breaker guards one remote resource. It watches consecutive failures
//! and a rolling outcome window, and once a resource looks down it rejects
//! calls synchronously until a cooldown elapses, then trials recovery with a
//! limited number of probe calls.
//!
//! All state lives behind a single mutex; every mutation is one synchronous
//! critical section and the protected operation always runs outside the lock.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::{Clock, ConfigError, ConfigResult, SystemClock};
use crate::error::ResilienceError;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing trial requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive successes needed to close the circuit from half-open
    pub success_threshold: u32,
    /// Cooldown before an open circuit trials recovery
    pub reset_timeout: Duration,
    /// Per-call deadline applied by `execute`
    pub operation_timeout: Duration,
    /// Capacity of the rolling outcome window
    pub window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(10),
            window_size: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }
        if self.window_size == 0 {
            return Err(ConfigError::invalid("window_size must be greater than 0"));
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::invalid("reset_timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Observer notified synchronously on state transitions.
///
/// Methods are infallible and run inside the transition's critical section;
/// implementations must be fast and must not call back into the breaker.
pub trait StateObserver: Send + Sync {
    /// The circuit tripped open; `retry_after` is the configured cooldown.
    fn on_open(&self, name: &str, retry_after: Duration) {
        let _ = (name, retry_after);
    }

    /// The circuit started trialing recovery.
    fn on_half_open(&self, name: &str) {
        let _ = name;
    }

    /// The circuit recovered fully.
    fn on_close(&self, name: &str) {
        let _ = name;
    }
}

/// Point-in-time snapshot of a breaker for health surfaces.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    /// Consecutive failures in the current closed phase.
    pub failure_count: u32,
    /// Consecutive successes in the current half-open phase.
    pub success_count: u32,
    /// Failure ratio over the rolling window, if any outcomes are recorded.
    pub window_failure_rate: Option<f64>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    /// Calls rejected without invoking the operation.
    pub total_rejections: u64,
    /// Remaining cooldown while open.
    pub next_attempt_in: Option<Duration>,
    /// Time since the most recent recorded failure.
    pub last_failure_age: Option<Duration>,
    /// Time since the most recent recorded success.
    pub last_success_age: Option<Duration>,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    window: VecDeque<bool>,
    next_attempt_at: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
    last_failure_at: Option<Instant>,
    last_success_at: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            window: VecDeque::new(),
            next_attempt_at: None,
            total_calls: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejections: 0,
            last_failure_at: None,
            last_success_at: None,
        }
    }

    fn push_outcome(&mut self, failed: bool, cap: usize) {
        if self.window.len() == cap {
            self.window.pop_front();
        }
        self.window.push_back(failed);
    }

    fn window_failure_rate(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        Some(failures as f64 / self.window.len() as f64)
    }
}

/// Circuit breaker guarding one named remote resource.
///
/// Intended to be long-lived and shared (`Arc`) across all call sites hitting
/// the same resource; sharing is what lets one caller's failures protect the
/// others.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    observer: Option<Arc<dyn StateObserver>>,
    clock: Arc<C>,
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker with the given configuration using system time.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing).
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
            observer: None,
            clock: Arc::new(clock),
        })
    }

    /// Attach a transition observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Name of the guarded resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_state(&self) -> MutexGuard<'_, BreakerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(breaker = %self.name, "circuit breaker state lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Admission decision. Performs the lazy Open -> HalfOpen transition.
    fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut inner = self.lock_state();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                inner.total_calls += 1;
                Ok(())
            }
            CircuitState::Open => {
                let next_attempt = inner.next_attempt_at.unwrap_or(now);
                if now >= next_attempt {
                    inner.state = CircuitState::HalfOpen;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.total_calls += 1;
                    info!(breaker = %self.name, "circuit breaker trialing recovery (HALF_OPEN)");
                    if let Some(observer) = &self.observer {
                        observer.on_half_open(&self.name);
                    }
                    Ok(())
                } else {
                    inner.total_rejections += 1;
                    Err(next_attempt.duration_since(now))
                }
            }
        }
    }

    fn trip_open(&self, inner: &mut BreakerState, now: Instant, reason: &str) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.next_attempt_at = Some(now + self.config.reset_timeout);
        warn!(
            breaker = %self.name,
            reason,
            cooldown_ms = self.config.reset_timeout.as_millis() as u64,
            "circuit breaker opened"
        );
        if let Some(observer) = &self.observer {
            observer.on_open(&self.name, self.config.reset_timeout);
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.lock_state();
        inner.total_successes += 1;
        inner.last_success_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                let cap = self.config.window_size;
                inner.push_outcome(false, cap);
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.next_attempt_at = None;
                    inner.window.clear();
                    info!(breaker = %self.name, "circuit breaker closed after recovery");
                    if let Some(observer) = &self.observer {
                        observer.on_close(&self.name);
                    }
                }
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "success recorded while open, ignoring");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock_state();
        inner.total_failures += 1;
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                let cap = self.config.window_size;
                inner.push_outcome(true, cap);

                let consecutive = inner.failure_count >= self.config.failure_threshold;
                let window_tripped = inner.window.len() == self.config.window_size
                    && inner.window_failure_rate().is_some_and(|rate| rate > 0.5);

                if consecutive {
                    self.trip_open(&mut inner, now, "consecutive failure threshold");
                } else if window_tripped {
                    self.trip_open(&mut inner, now, "rolling window failure rate");
                }
            }
            CircuitState::HalfOpen => {
                // A single failed probe aborts the recovery trial.
                self.trip_open(&mut inner, now, "failure during recovery trial");
            }
            CircuitState::Open => {}
        }
    }

    /// Execute an operation under this breaker.
    ///
    /// Applies the configured per-call `operation_timeout`, records the
    /// outcome, and re-surfaces the original error (a timeout counts as a
    /// failure). An open circuit rejects synchronously with the remaining
    /// cooldown, never invoking the operation.
    #[instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.guard(|| async {
            match tokio::time::timeout(self.config.operation_timeout, operation()).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
                Err(_) => Err(ResilienceError::Timeout {
                    timeout: self.config.operation_timeout,
                    context: self.name.clone(),
                }),
            }
        })
        .await
    }

    /// Guard an operation that already yields `ResilienceError<E>`.
    ///
    /// Used when another layer (the orchestrator's deadline) owns the
    /// timeout; errors pass through unchanged, each one counting as a
    /// failure.
    pub async fn guard<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Err(retry_after) = self.try_acquire() {
            debug!(
                breaker = %self.name,
                retry_in_ms = retry_after.as_millis() as u64,
                "circuit breaker rejecting call"
            );
            return Err(ResilienceError::CircuitOpen { retry_after });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    /// Current state of the breaker.
    pub fn state(&self) -> CircuitState {
        self.lock_state().state
    }

    /// Whether the breaker currently admits calls without a recovery trial.
    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Snapshot of the breaker for monitoring.
    pub fn stats(&self) -> CircuitBreakerStats {
        let now = self.clock.now();
        let inner = self.lock_state();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            window_failure_rate: inner.window_failure_rate(),
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejections: inner.total_rejections,
            next_attempt_in: match inner.state {
                CircuitState::Open => inner
                    .next_attempt_at
                    .map(|at| at.saturating_duration_since(now)),
                _ => None,
            },
            last_failure_age: inner.last_failure_at.map(|at| now.saturating_duration_since(at)),
            last_success_age: inner.last_success_at.map(|at| now.saturating_duration_since(at)),
        }
    }

    /// Force the breaker back to closed, clearing all counters.
    pub fn reset(&self) {
        let mut inner = self.lock_state();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.next_attempt_at = None;
        inner.window.clear();
        info!(breaker = %self.name, "circuit breaker manually reset");
    }

    /// Force the breaker open for the given duration.
    ///
    /// Useful for maintenance windows and manual load shedding.
    pub fn force_open(&self, duration: Duration) {
        let now = self.clock.now();
        let mut inner = self.lock_state();
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.next_attempt_at = Some(now + duration);
        warn!(
            breaker = %self.name,
            duration_ms = duration.as_millis() as u64,
            "circuit breaker forced open"
        );
        if let Some(observer) = &self.observer {
            observer.on_open(&self.name, duration);
        }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
