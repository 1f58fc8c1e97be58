//! Typed error taxonomy for remote operations.
//!
//! Every failure that leaves the resilience layer is an [`ApiError`] carrying
//! a [`ErrorKind`], a human message, the originating operation context, and a
//! wall-clock timestamp. Retryability and severity are derived **solely from
//! the kind** (never from caller context) so classification stays
//! deterministic and testable in isolation.
//!
//! [`ApiError::from_status`] is the single translation point from raw
//! transport status codes into the taxonomy; new transports only need to feed
//! their status through it.
//!
//! The [`ResilienceError`] wrapper adds the two failure modes the resilience
//! primitives themselves introduce (breaker rejection and deadline expiry)
//! while preserving the wrapped operation error unchanged.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Boxed source error preserved alongside the classified kind.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse severity classification used for user messaging and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected user-facing conditions (input validation).
    Low,
    /// Degraded but recoverable by the user (conflicts, business rules).
    Medium,
    /// Requires attention (auth, permissions, database).
    High,
    /// Service integrity at risk.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Standard interface for classifying errors by their characteristics.
///
/// Implemented by [`ApiError`] and by [`ResilienceError`] (delegating to the
/// wrapped error where applicable) so retry and breaker logic can treat both
/// uniformly.
pub trait ErrorClassification {
    /// Whether the failed operation may be retried.
    fn is_retryable(&self) -> bool;

    /// Severity level for messaging and alerting.
    fn severity(&self) -> Severity;

    /// Server-suggested retry delay, if the error carries one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Discriminant of an [`ApiError`] with kind-specific payload fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Connectivity failures; carries the raw transport status if known.
    Network {
        /// Transport status code, when the failure came from a response.
        status: Option<u16>,
    },
    /// An operation exceeded its deadline.
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },
    /// Input failed validation.
    Validation,
    /// Credentials missing or rejected.
    Authentication,
    /// Caller lacks the permission for the operation.
    InsufficientPermissions {
        /// Permission that would have been required, if known.
        required_permission: Option<String>,
    },
    /// Requested resource does not exist.
    NotFound {
        /// Human name of the missing resource type.
        resource: String,
    },
    /// Concurrent modification conflict.
    Conflict {
        /// Server-reported conflicting payload, if any.
        conflicting: Option<serde_json::Value>,
    },
    /// Request quota exhausted.
    RateLimit {
        /// Server-specified wait before retrying.
        retry_after: Option<Duration>,
        /// Quota limit, if reported.
        limit: Option<u32>,
        /// Remaining quota, if reported.
        remaining: Option<u32>,
    },
    /// Backend storage failure.
    Database {
        /// Affected table, if known.
        table: Option<String>,
    },
    /// A domain rule rejected the operation.
    BusinessLogic {
        /// Identifier of the violated rule.
        rule: Option<String>,
    },
    /// Stored data violates a consistency constraint.
    DataIntegrity {
        /// Affected field.
        field: Option<String>,
        /// Violated constraint.
        constraint: Option<String>,
    },
    /// Dependency reported itself down (503).
    ServiceUnavailable,
    /// Payload could not be decoded.
    Parse {
        /// Format the decoder expected.
        expected_format: Option<String>,
    },
}

impl ErrorKind {
    /// Stable machine-readable code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT_ERROR",
            Self::RateLimit { .. } => "RATE_LIMIT_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::BusinessLogic { .. } => "BUSINESS_LOGIC_ERROR",
            Self::DataIntegrity { .. } => "DATA_INTEGRITY_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Parse { .. } => "PARSE_ERROR",
        }
    }
}

/// Classified error raised by (or translated at the boundary of) a remote
/// operation.
///
/// Constructors never perform I/O or side effects; they only capture the
/// classification and a timestamp.
#[derive(Debug)]
pub struct ApiError {
    /// Kind discriminant driving classification.
    pub kind: ErrorKind,
    /// Human-readable description of the failure.
    pub message: String,
    /// Name of the calling operation (e.g. `"leave.fetch_requests"`).
    pub context: String,
    /// Wall-clock instant the error was raised.
    pub timestamp: DateTime<Utc>,
    /// Lower-level error this one classifies, if any.
    pub source: Option<BoxedSource>,
}

impl ApiError {
    /// Create an error of the given kind. No I/O, no side effects.
    pub fn new(kind: ErrorKind, message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: context.into(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Attach the lower-level error this one classifies.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Connectivity failure without a known status code.
    pub fn network(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network { status: None }, message, context)
    }

    /// Connectivity failure carrying the raw transport status.
    pub fn network_status(
        message: impl Into<String>,
        context: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::new(ErrorKind::Network { status: Some(status) }, message, context)
    }

    /// Deadline expiry for the given timeout.
    pub fn timeout(context: impl Into<String>, timeout: Duration) -> Self {
        let context = context.into();
        Self::new(
            ErrorKind::Timeout { timeout },
            format!("{} timed out after {}ms", context, timeout.as_millis()),
            context,
        )
    }

    /// Input validation failure.
    pub fn validation(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, context)
    }

    /// Credential failure.
    pub fn authentication(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message, context)
    }

    /// Missing permission.
    pub fn insufficient_permissions(
        message: impl Into<String>,
        context: impl Into<String>,
        required_permission: Option<String>,
    ) -> Self {
        Self::new(ErrorKind::InsufficientPermissions { required_permission }, message, context)
    }

    /// Missing resource.
    pub fn not_found(resource: impl Into<String>, context: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::new(
            ErrorKind::NotFound { resource: resource.clone() },
            format!("{resource} not found"),
            context,
        )
    }

    /// Concurrent modification conflict.
    pub fn conflict(
        message: impl Into<String>,
        context: impl Into<String>,
        conflicting: Option<serde_json::Value>,
    ) -> Self {
        Self::new(ErrorKind::Conflict { conflicting }, message, context)
    }

    /// Rate limiting with an optional server-specified wait.
    pub fn rate_limit(
        message: impl Into<String>,
        context: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::new(
            ErrorKind::RateLimit { retry_after, limit: None, remaining: None },
            message,
            context,
        )
    }

    /// Backend storage failure.
    pub fn database(
        message: impl Into<String>,
        context: impl Into<String>,
        table: Option<String>,
    ) -> Self {
        Self::new(ErrorKind::Database { table }, message, context)
    }

    /// Domain rule violation.
    pub fn business_logic(
        message: impl Into<String>,
        context: impl Into<String>,
        rule: Option<String>,
    ) -> Self {
        Self::new(ErrorKind::BusinessLogic { rule }, message, context)
    }

    /// Data consistency violation.
    pub fn data_integrity(
        message: impl Into<String>,
        context: impl Into<String>,
        field: Option<String>,
        constraint: Option<String>,
    ) -> Self {
        Self::new(ErrorKind::DataIntegrity { field, constraint }, message, context)
    }

    /// Dependency down.
    pub fn service_unavailable(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message, context)
    }

    /// Payload decoding failure.
    pub fn parse(
        message: impl Into<String>,
        context: impl Into<String>,
        expected_format: Option<String>,
    ) -> Self {
        Self::new(ErrorKind::Parse { expected_format }, message, context)
    }

    /// Translate a raw transport status code into the taxonomy.
    ///
    /// This is the single point where transport-specific signals become
    /// internal kinds; new transports only implement this one mapping.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            400 => Self::validation("Bad Request", context),
            401 => Self::authentication("Unauthorized", context),
            403 => Self::insufficient_permissions("Forbidden", context, None),
            404 => Self::not_found("Resource", context),
            408 => Self::timeout(context, Duration::from_secs(30)),
            409 => Self::conflict("Conflict", context, None),
            429 => Self::rate_limit("Too Many Requests", context, None),
            500 => Self::database("Internal Server Error", context, None),
            503 => Self::service_unavailable("Service Unavailable", context),
            _ => Self::network_status(format!("HTTP error {status}"), context, status),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Structured key/value pairs suitable for `tracing` fields or log-entry
    /// metadata.
    pub fn as_log_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("code", self.code().to_string()),
            ("context", self.context.clone()),
            ("severity", self.severity().to_string()),
            ("retryable", self.is_retryable().to_string()),
        ];
        match &self.kind {
            ErrorKind::Network { status: Some(status) } => {
                fields.push(("status", status.to_string()));
            }
            ErrorKind::Timeout { timeout } => {
                fields.push(("timeout_ms", timeout.as_millis().to_string()));
            }
            ErrorKind::RateLimit { retry_after: Some(retry), .. } => {
                fields.push(("retry_after_ms", retry.as_millis().to_string()));
            }
            ErrorKind::Database { table: Some(table) } => {
                fields.push(("table", table.clone()));
            }
            ErrorKind::BusinessLogic { rule: Some(rule) } => {
                fields.push(("rule", rule.clone()));
            }
            _ => {}
        }
        fields
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code(), self.context, self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl ErrorClassification for ApiError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Network { .. }
                | ErrorKind::Timeout { .. }
                | ErrorKind::ServiceUnavailable
                | ErrorKind::RateLimit { .. }
        )
    }

    fn severity(&self) -> Severity {
        match self.kind {
            ErrorKind::Validation => Severity::Low,
            ErrorKind::Conflict { .. } | ErrorKind::BusinessLogic { .. } => Severity::Medium,
            ErrorKind::Authentication
            | ErrorKind::InsufficientPermissions { .. }
            | ErrorKind::Database { .. } => Severity::High,
            ErrorKind::ServiceUnavailable => Severity::Critical,
            _ => Severity::Medium,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            ErrorKind::RateLimit { retry_after, .. } => retry_after,
            _ => None,
        }
    }
}

/// Failure modes introduced by the resilience primitives themselves, wrapping
/// the operation error type `E` unchanged.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The circuit breaker refused the call; the wrapped operation was never
    /// invoked. Carries the remaining cooldown.
    #[error("circuit breaker is open, retry in {retry_after:?}")]
    CircuitOpen {
        /// Remaining wait until the breaker will trial a call again.
        retry_after: Duration,
    },

    /// A deadline expired before the operation settled.
    #[error("{context} timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
        /// Operation the deadline guarded.
        context: String,
    },

    /// The wrapped operation itself failed.
    #[error("operation failed: {source}")]
    OperationFailed {
        /// The original, unmodified operation error.
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Recover the original operation error, if this wraps one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: ErrorClassification + std::error::Error + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            // Rejections and deadline expiries are transient by nature.
            Self::CircuitOpen { .. } | Self::Timeout { .. } => true,
            Self::OperationFailed { source } => source.is_retryable(),
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::CircuitOpen { .. } => Severity::High,
            Self::Timeout { .. } => Severity::Medium,
            Self::OperationFailed { source } => source.severity(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after } => Some(*retry_after),
            Self::Timeout { .. } => None,
            Self::OperationFailed { source } => source.retry_after(),
        }
    }
}
