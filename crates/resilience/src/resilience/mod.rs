//! Resilience patterns for remote calls
//!
//! This module provides the fault-tolerance primitives used around every
//! remote operation:
//! - **Circuit Breaker**: Prevents cascading failures by detecting and
//!   stopping repeated failures per resource
//! - **Retry Logic**: Classification-driven retries with exponential backoff
//!   and jitter
//! - **Timeouts**: Deadline wrappers including an adaptive, latency-tracking
//!   variant
//! - **Orchestrator**: Composes the three into a single execution chain
//!
//! All primitives are generic over the operation error type and speak
//! [`ResilienceError`](crate::error::ResilienceError) at their seams, so the
//! original operation error always survives the composition unchanged.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub mod circuit_breaker;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerStats,
    CircuitState, StateObserver,
};
pub use orchestrator::{Preset, ResilienceConfig, ResilienceConfigBuilder};
pub use registry::{global_registry, BreakerRegistry};
pub use retry::{
    policies, retry_with_backoff, JitterSource, NoJitter, RetryConfig, RetryConfigBuilder,
    RetryDecision, RetryExecutor, RetryObserver, RetryOutcome, RetryPolicy, ThreadRngJitter,
};
pub use timeout::{
    abortable, all, deadline, race, with_progress, AbortHandle, AdaptiveTimeout,
    AdaptiveTimeoutConfig, TimeoutClass,
};

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Result type for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Trait for time operations to enable deterministic testing
///
/// This trait allows the circuit breaker and the adaptive timeout to use real
/// system time in production and controlled mock time in tests, enabling
/// deterministic testing of timeout-based behavior without actual delays.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Allows tests to control time progression without actual delays.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let elapsed = self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO);
        self.start + elapsed
    }

    fn system_time(&self) -> SystemTime {
        let elapsed = self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO);
        SystemTime::UNIX_EPOCH + elapsed
    }
}
