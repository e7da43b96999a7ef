pub mod messages;

use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Boundary to the push-delivery collaborator. The core renders the message
/// text and hands it over with the actor's opaque contact identity; delivery
/// failures are logged by the caller and never block a state transition.
pub trait Notifier: Send + Sync {
    fn deliver(&self, contact: &str, message: &str) -> Result<(), NotifyError>;
}

/// Default impl: write the notification to the log stream.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, contact: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(contact, message, "notification");
        Ok(())
    }
}

/// Captures deliveries for assertions. Used by the operational test surface.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn messages_for(&self, contact: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == contact)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, contact: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((contact.to_string(), message.to_string()));
        Ok(())
    }
}
