//! Fault-tolerance toolkit for Teamwerk remote calls
//!
//! Everything the console needs to survive a flaky backend, in four layers:
//!
//! - [`error`]: the typed error taxonomy ([`ApiError`]) with deterministic
//!   retryability and severity classification, plus the
//!   [`ResilienceError`] wrapper the primitives speak at their seams
//! - [`resilience`]: circuit breaker, retry with backoff, timeout wrappers,
//!   and the orchestrator composing them
//! - [`handler`]: user-facing messages and notification dispatch
//! - [`logger`]: the bounded in-memory error log for diagnostics
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use teamwerk_resilience::error::ApiError;
//! use teamwerk_resilience::resilience::{
//!     BreakerRegistry, CircuitBreakerConfig, Preset, ResilienceConfig,
//! };
//!
//! # async fn fetch_employees() -> Result<Vec<String>, ApiError> { Ok(vec![]) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = BreakerRegistry::new();
//! let breaker = registry.register("employee-api", CircuitBreakerConfig::default())?;
//!
//! let config = ResilienceConfig::preset(Preset::Standard, "employees.list")
//!     .with_circuit_breaker(Arc::clone(&breaker));
//!
//! let employees = config.execute(|| fetch_employees()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handler;
pub mod logger;
pub mod resilience;

pub use error::{ApiError, ErrorClassification, ErrorKind, ResilienceError, Severity};
pub use handler::{
    notification_level, requires_authentication, requires_permission, user_message, ErrorHandler,
    NotificationLevel, NotificationSink,
};
pub use logger::{install_panic_hook, ErrorLogEntry, ErrorLogger, LoggerStatistics};
pub use resilience::{
    global_registry, retry_with_backoff, AdaptiveTimeout, AdaptiveTimeoutConfig, BreakerRegistry,
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Clock, ConfigError,
    MockClock, Preset, ResilienceConfig, RetryConfig, RetryExecutor, RetryPolicy, SystemClock,
    TimeoutClass,
};
