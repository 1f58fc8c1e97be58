//! Process-wide registry of named circuit breakers
//!
//! One breaker per resource name, created once and shared by every call site
//! hitting that resource. The registry is constructed at process start and
//! handed around by reference; breakers live for the process lifetime.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use super::ConfigResult;

static GLOBAL_REGISTRY: Lazy<BreakerRegistry> = Lazy::new(BreakerRegistry::new);

/// The process-wide default registry.
///
/// Call sites that cannot have a registry injected share this one; anything
/// with access to dependency wiring should prefer its own instance.
pub fn global_registry() -> &'static BreakerRegistry {
    &GLOBAL_REGISTRY
}

/// Registry mapping resource names to their shared breakers.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { breakers: DashMap::new() }
    }

    /// Register a breaker for `name`, replacing any previous one.
    pub fn register(
        &self,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<Arc<CircuitBreaker>> {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config)?);
        debug!(breaker = %name, "registered circuit breaker");
        self.breakers.insert(name, Arc::clone(&breaker));
        Ok(breaker)
    }

    /// Look up the breaker for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Get the breaker for `name`, creating it with `f` on first use.
    pub fn get_or_insert_with<F>(&self, name: &str, f: F) -> Arc<CircuitBreaker>
    where
        F: FnOnce() -> Arc<CircuitBreaker>,
    {
        Arc::clone(
            self.breakers
                .entry(name.to_string())
                .or_insert_with(f)
                .value(),
        )
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot of every breaker, for health-check surfaces.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.iter().map(|entry| entry.value().stats()).collect()
    }

    /// Reset every breaker to closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}
