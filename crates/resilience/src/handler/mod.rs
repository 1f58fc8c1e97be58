//! Central error handling: user messaging and notification dispatch
//!
//! Maps every [`ApiError`] to a fixed, non-technical user-facing message
//! (the console's German product strings) and a presentation level, then
//! fans the error out to the log ring and a toast sink. Handling is a pure
//! side channel: the error itself is never altered or swallowed here.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ApiError, ErrorKind};
use crate::logger::ErrorLogger;

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Blocking failure, red toast.
    Error,
    /// Recoverable condition, yellow toast.
    Warning,
}

/// Destination for user-facing notifications.
pub trait NotificationSink: Send + Sync {
    /// Present `message` to the user at the given level.
    fn notify(&self, message: &str, level: NotificationLevel);
}

/// Fixed, non-technical user message for an error.
///
/// Total over all kinds and never panics; the RateLimit message interpolates
/// the server-specified wait when present.
pub fn user_message(error: &ApiError) -> String {
    match &error.kind {
        ErrorKind::Network { .. } => {
            "Netzwerkfehler. Bitte überprüfen Sie Ihre Internetverbindung.".to_string()
        }
        ErrorKind::Timeout { .. } => {
            "Die Anfrage hat zu lange gedauert. Bitte versuchen Sie es erneut.".to_string()
        }
        ErrorKind::Validation => "Bitte überprüfen Sie Ihre Eingaben.".to_string(),
        ErrorKind::Authentication => {
            "Ihre Sitzung ist abgelaufen. Bitte melden Sie sich erneut an.".to_string()
        }
        ErrorKind::InsufficientPermissions { .. } => {
            "Sie haben keine Berechtigung für diese Aktion.".to_string()
        }
        ErrorKind::NotFound { .. } => {
            "Die angeforderten Daten wurden nicht gefunden.".to_string()
        }
        ErrorKind::Conflict { .. } => {
            "Die Daten wurden zwischenzeitlich geändert. Bitte laden Sie die Ansicht neu."
                .to_string()
        }
        ErrorKind::RateLimit { retry_after, .. } => match retry_after {
            Some(wait) => format!(
                "Zu viele Anfragen. Bitte warten Sie {} Sekunden.",
                wait.as_secs().max(1)
            ),
            None => "Zu viele Anfragen. Bitte warten Sie einen Moment.".to_string(),
        },
        ErrorKind::Database { .. } => {
            "Ein Datenbankfehler ist aufgetreten. Bitte versuchen Sie es später erneut."
                .to_string()
        }
        ErrorKind::BusinessLogic { .. } => {
            "Die Aktion konnte nicht ausgeführt werden.".to_string()
        }
        ErrorKind::DataIntegrity { .. } => {
            "Es ist ein Datenfehler aufgetreten. Bitte kontaktieren Sie den Support.".to_string()
        }
        ErrorKind::ServiceUnavailable => {
            "Der Dienst ist vorübergehend nicht verfügbar. Bitte versuchen Sie es später erneut."
                .to_string()
        }
        ErrorKind::Parse { .. } => {
            "Die Antwort des Servers konnte nicht verarbeitet werden.".to_string()
        }
    }
}

/// Presentation level for an error's notification.
///
/// Conflicts and rate limits are expected, user-recoverable conditions and
/// render as warnings; everything else is an error toast.
pub fn notification_level(error: &ApiError) -> NotificationLevel {
    match error.kind {
        ErrorKind::Conflict { .. } | ErrorKind::RateLimit { .. } => NotificationLevel::Warning,
        _ => NotificationLevel::Error,
    }
}

/// Whether the error means the user must re-authenticate.
pub fn requires_authentication(error: &ApiError) -> bool {
    matches!(error.kind, ErrorKind::Authentication)
}

/// The permission the user lacked, if the error is a permission failure.
pub fn requires_permission(error: &ApiError) -> Option<&str> {
    match &error.kind {
        ErrorKind::InsufficientPermissions { required_permission } => {
            Some(required_permission.as_deref().unwrap_or(""))
        }
        _ => None,
    }
}

/// Central handler fanning errors out to the log ring and the toast sink.
pub struct ErrorHandler {
    logger: Arc<ErrorLogger>,
    sink: Arc<dyn NotificationSink>,
}

impl ErrorHandler {
    /// Create a handler over the shared logger and notification sink.
    pub fn new(logger: Arc<ErrorLogger>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { logger, sink }
    }

    /// Log the error, then notify the user.
    ///
    /// Pure side channel: returns nothing and never alters the error.
    pub fn handle(&self, error: &ApiError) {
        debug!(code = error.code(), context = %error.context, "handling error");
        self.logger.log(error);
        self.sink.notify(&user_message(error), notification_level(error));
    }

    /// The shared logger behind this handler.
    pub fn logger(&self) -> &Arc<ErrorLogger> {
        &self.logger
    }
}
