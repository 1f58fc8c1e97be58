//! In-memory error log for diagnostics surfaces
//!
//! [`ErrorLogger`] keeps a bounded ring of recent [`ErrorLogEntry`] records
//! (oldest evicted first) and offers read-only queries over it: filtering by
//! severity and context, recency windows, aggregate statistics, and JSON
//! export for support bundles. Every append also emits a `tracing` event at
//! the severity-mapped level, so the structured log pipeline sees the same
//! failures the in-memory ring does.
//!
//! The ring is deliberately small; this is a diagnostics buffer, not an
//! observability backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, ErrorClassification, Severity};

/// Default capacity of the log ring.
pub const DEFAULT_CAPACITY: usize = 100;

/// One recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    /// Unique id of this entry.
    pub id: Uuid,
    /// Wall-clock instant the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity at record time.
    pub severity: Severity,
    /// Operation context the error came from.
    pub context: String,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured extras (kind-specific fields).
    pub metadata: Option<Value>,
}

/// Aggregate view over the current ring contents.
#[derive(Debug, Clone, Serialize)]
pub struct LoggerStatistics {
    /// Entries currently held.
    pub total: usize,
    /// Entry count per severity.
    pub by_severity: HashMap<Severity, usize>,
    /// Entry count per context.
    pub by_context: HashMap<String, usize>,
    /// Entries recorded in the trailing 24 hours.
    pub last_24h: usize,
}

/// Bounded in-memory error log.
#[derive(Debug)]
pub struct ErrorLogger {
    capacity: usize,
    enabled: AtomicBool,
    entries: Mutex<Vec<ErrorLogEntry>>,
}

impl Default for ErrorLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorLogger {
    /// Create a logger with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a logger holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            enabled: AtomicBool::new(true),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<ErrorLogEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("error log lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    /// Enable or disable recording. Queries keep working either way.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether recording is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record an [`ApiError`].
    ///
    /// Kind-specific fields become the entry's metadata; the append also
    /// emits a `tracing` event at the severity-mapped level.
    pub fn log(&self, error: &ApiError) {
        if !self.is_enabled() {
            return;
        }

        let metadata: serde_json::Map<String, Value> = error
            .as_log_fields()
            .into_iter()
            .map(|(key, value)| (key.to_string(), Value::String(value)))
            .collect();

        let entry = ErrorLogEntry {
            id: Uuid::new_v4(),
            timestamp: error.timestamp,
            severity: error.severity(),
            context: error.context.clone(),
            code: error.code().to_string(),
            message: error.message.clone(),
            metadata: Some(Value::Object(metadata)),
        };
        self.emit(&entry);
        self.push(entry);
    }

    /// Record a failure that is not an [`ApiError`] (panics, infrastructure).
    pub fn log_raw(
        &self,
        severity: Severity,
        context: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        metadata: Option<Value>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let entry = ErrorLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            context: context.into(),
            code: code.into(),
            message: message.into(),
            metadata,
        };
        self.emit(&entry);
        self.push(entry);
    }

    fn emit(&self, entry: &ErrorLogEntry) {
        match entry.severity {
            Severity::Low => tracing::debug!(
                code = %entry.code,
                context = %entry.context,
                "{}",
                entry.message
            ),
            Severity::Medium => tracing::warn!(
                code = %entry.code,
                context = %entry.context,
                "{}",
                entry.message
            ),
            Severity::High | Severity::Critical => tracing::error!(
                code = %entry.code,
                context = %entry.context,
                severity = %entry.severity,
                "{}",
                entry.message
            ),
        }
    }

    fn push(&self, entry: ErrorLogEntry) {
        let mut entries = self.lock_entries();
        if entries.len() == self.capacity {
            entries.remove(0);
        }
        entries.push(entry);
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.lock_entries().clone()
    }

    /// Entries of exactly the given severity, oldest first.
    pub fn by_severity(&self, severity: Severity) -> Vec<ErrorLogEntry> {
        self.lock_entries().iter().filter(|e| e.severity == severity).cloned().collect()
    }

    /// Entries whose context contains the given fragment, oldest first.
    pub fn by_context(&self, fragment: &str) -> Vec<ErrorLogEntry> {
        self.lock_entries().iter().filter(|e| e.context.contains(fragment)).cloned().collect()
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorLogEntry> {
        let entries = self.lock_entries();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    /// Entries recorded within the trailing window.
    pub fn count_since(&self, window: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        self.lock_entries().iter().filter(|e| e.timestamp >= cutoff).count()
    }

    /// Entries per minute over the trailing window.
    pub fn error_rate(&self, window: Duration) -> f64 {
        let secs = window.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.count_since(window) as f64 / secs * 60.0
    }

    /// Whether any recorded entry is critical.
    pub fn has_critical(&self) -> bool {
        self.lock_entries().iter().any(|e| e.severity == Severity::Critical)
    }

    /// Aggregate counts over the current ring.
    pub fn statistics(&self) -> LoggerStatistics {
        let entries = self.lock_entries();
        let mut by_severity: HashMap<Severity, usize> = HashMap::new();
        let mut by_context: HashMap<String, usize> = HashMap::new();
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let mut last_24h = 0;

        for entry in entries.iter() {
            *by_severity.entry(entry.severity).or_insert(0) += 1;
            *by_context.entry(entry.context.clone()).or_insert(0) += 1;
            if entry.timestamp >= cutoff {
                last_24h += 1;
            }
        }

        LoggerStatistics { total: entries.len(), by_severity, by_context, last_24h }
    }

    /// Serialize the current ring for support bundles.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries())
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }
}

/// Install a process-wide panic hook that records panics as critical
/// entries before the previously installed hook runs.
pub fn install_panic_hook(logger: Arc<ErrorLogger>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        let location = info.location().map(|l| l.to_string());

        logger.log_raw(
            Severity::Critical,
            location.unwrap_or_else(|| "unknown".to_string()),
            "PANIC",
            message,
            None,
        );
        previous(info);
    }));
}
