//! Composition of timeout, circuit breaker, and retry
//!
//! A [`ResilienceConfig`] describes which primitives wrap a call and with
//! what settings. The chain is built innermost to outermost: the deadline
//! wraps the raw operation, the breaker guards the deadline-wrapped
//! operation, and retry re-runs the guarded whole. That order means every
//! attempt gets its own deadline, every attempt's outcome feeds the breaker,
//! and a breaker rejection is itself a retryable (transient) failure.
//!
//! Breaker instances are shared per resource, so they are always attached
//! explicitly via [`ResilienceConfig::with_circuit_breaker`] rather than
//! created by a preset.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use super::circuit_breaker::CircuitBreaker;
use super::retry::{policies, RetryConfig, RetryExecutor};
use super::timeout::deadline;
use crate::error::{ErrorClassification, ResilienceError};

/// Ready-made resilience profiles for common call shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Must-succeed user-facing writes: 5 aggressive retries, 10s deadline.
    Critical,
    /// Typical reads and writes: 3 balanced retries, 10s deadline.
    Standard,
    /// Latency-sensitive lookups: 2 aggressive retries, 5s deadline.
    Quick,
    /// Batch work: 2 conservative retries, 60s deadline.
    Background,
    /// Direct call without any wrapping.
    None,
}

fn aggressive_retries(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
        timeout: None,
    }
}

fn balanced_retries(max_retries: u32) -> RetryConfig {
    RetryConfig { max_retries, timeout: None, ..RetryConfig::default() }
}

fn conservative_retries(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 1.5,
        timeout: None,
    }
}

/// Which primitives wrap a call, and with what settings.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Per-attempt deadline; `None` disables the deadline layer.
    pub timeout: Option<Duration>,
    /// Shared breaker guarding the target resource.
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
    /// Retry settings; `None` disables the retry layer.
    pub retry: Option<RetryConfig>,
    /// Operation name carried into errors and logs.
    pub context: String,
}

impl ResilienceConfig {
    /// Start a builder for a custom profile.
    pub fn builder(context: impl Into<String>) -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new(context)
    }

    /// Build a config from a preset profile.
    pub fn preset(preset: Preset, context: impl Into<String>) -> Self {
        let context = context.into();
        match preset {
            Preset::Critical => Self {
                timeout: Some(Duration::from_secs(10)),
                circuit_breaker: None,
                retry: Some(aggressive_retries(5)),
                context,
            },
            Preset::Standard => Self {
                timeout: Some(Duration::from_secs(10)),
                circuit_breaker: None,
                retry: Some(balanced_retries(3)),
                context,
            },
            Preset::Quick => Self {
                timeout: Some(Duration::from_secs(5)),
                circuit_breaker: None,
                retry: Some(aggressive_retries(2)),
                context,
            },
            Preset::Background => Self {
                timeout: Some(Duration::from_secs(60)),
                circuit_breaker: None,
                retry: Some(conservative_retries(2)),
                context,
            },
            Preset::None => Self { timeout: None, circuit_breaker: None, retry: None, context },
        }
    }

    /// Attach the shared breaker for the target resource.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Run one attempt: deadline innermost, breaker around it.
    async fn attempt<Fut, T, E>(&self, fut: Fut) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let timeout = self.timeout;
        let context = self.context.clone();
        let run = move || async move {
            match timeout {
                Some(t) => deadline(fut, t, &context).await,
                None => fut.await.map_err(|source| ResilienceError::OperationFailed { source }),
            }
        };

        match &self.circuit_breaker {
            Some(breaker) => breaker.guard(run).await,
            None => run().await,
        }
    }

    /// Execute the operation under the configured chain.
    ///
    /// `operation` is invoked once per attempt; the future it returns is the
    /// raw remote call.
    #[instrument(skip(self, operation), fields(context = %self.context))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + std::error::Error + Send + Sync + 'static,
    {
        match &self.retry {
            Some(retry_config) => {
                let executor = RetryExecutor::new(retry_config.clone(), policies::Classified);
                executor.execute(|| self.attempt(operation())).await
            }
            None => self.attempt(operation()).await,
        }
    }
}

/// Builder for [`ResilienceConfig`]
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            config: ResilienceConfig {
                timeout: None,
                circuit_breaker: None,
                retry: None,
                context: context.into(),
            },
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.config.circuit_breaker = Some(breaker);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = Some(retry);
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}
