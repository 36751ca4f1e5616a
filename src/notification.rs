use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::api::ApiError;
use crate::document::DocumentError;
use crate::media::MediaError;
use crate::recording::RecordingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Destructive,
}

/// A toast shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Destructive
    }
}

impl From<&ApiError> for Notification {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Validation(message) => Notification::error(message.clone()),
            ApiError::Unauthorized(_) => Notification {
                title: "Not authorized".to_string(),
                description: "The speech service rejected the credentials".to_string(),
                severity: Severity::Destructive,
            },
            ApiError::QuotaExceeded(_) => Notification {
                title: "Quota exceeded".to_string(),
                description: "The character quota for this account is used up".to_string(),
                severity: Severity::Destructive,
            },
            ApiError::RateLimited => Notification {
                title: "Too many requests".to_string(),
                description: "Please wait a moment and try again".to_string(),
                severity: Severity::Destructive,
            },
            ApiError::Network(_) => Notification::error("Could not reach the speech service"),
            ApiError::PayloadTooLarge(_) => Notification::error("The generated audio is too large"),
            other => Notification::error(format!("Conversion failed: {}", other)),
        }
    }
}

impl From<&MediaError> for Notification {
    fn from(err: &MediaError) -> Self {
        Notification::error(format!("Could not play audio: {}", err))
    }
}

impl From<&RecordingError> for Notification {
    fn from(err: &RecordingError) -> Self {
        match err {
            RecordingError::NoVoiceSelected => Notification {
                title: "Notice".to_string(),
                description: "Please select a voice first".to_string(),
                severity: Severity::Destructive,
            },
            RecordingError::MicrophoneDenied(_) => Notification::error("Could not access the microphone"),
            RecordingError::Processing(api) => Notification::from(api),
            other => Notification::error(other.to_string()),
        }
    }
}

impl From<&DocumentError> for Notification {
    fn from(err: &DocumentError) -> Self {
        match err {
            DocumentError::InvalidFileType(_) => Notification::error("Please choose a valid PDF file"),
            DocumentError::Empty => Notification::error("The document contains no text"),
            DocumentError::Extraction(_) => Notification::error("Something went wrong while reading the file"),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log; the default for headless runs
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => log::info!("🔔 {}: {}", notification.title, notification.description),
            Severity::Destructive => {
                log::error!("🔔 {}: {}", notification.title, notification.description)
            }
        }
    }
}

/// Keeps every notification in memory so callers can inspect them
#[derive(Clone, Default)]
pub struct NotificationLog {
    entries: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Notification> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.entries().into_iter().filter(|n| n.is_error()).collect()
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_and_auth_map_to_distinct_notifications() {
        let quota = Notification::from(&ApiError::QuotaExceeded("out of credits".into()));
        let auth = Notification::from(&ApiError::Unauthorized("bad key".into()));
        assert_eq!(quota.title, "Quota exceeded");
        assert_eq!(auth.title, "Not authorized");
        assert!(quota.is_error() && auth.is_error());
    }

    #[test]
    fn test_recording_processing_error_uses_api_mapping() {
        let err = RecordingError::Processing(ApiError::RateLimited);
        assert_eq!(Notification::from(&err).title, "Too many requests");
    }

    #[test]
    fn test_log_collects_entries() {
        let log = NotificationLog::new();
        log.notify(Notification::info("Done", "Audio ready"));
        log.notify(Notification::error("boom"));
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.errors().len(), 1);
    }
}
