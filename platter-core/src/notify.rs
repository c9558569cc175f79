use async_trait::async_trait;
use platter_shared::models::NotificationEvent;
use std::sync::Mutex;

use crate::{CoreError, CoreResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> CoreResult<()>;
}

/// Sends `event` and swallows any failure after logging it.
///
/// The operation that triggered the notification has already been committed,
/// so a delivery problem must never surface to its caller.
pub async fn notify_quietly(notifier: &dyn Notifier, event: NotificationEvent) {
    if let Err(e) = notifier.notify(&event).await {
        tracing::warn!(
            "Notification {} to {} failed: {}",
            event.kind.as_str(),
            event.recipient_id,
            e
        );
    }
}

/// Writes notifications to the trace log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> CoreResult<()> {
        tracing::info!(
            kind = event.kind.as_str(),
            recipient = %event.recipient_id,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory; can be switched to fail every send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> CoreResult<()> {
        if self.fail {
            return Err(CoreError::UpstreamError("notification channel down".into()));
        }
        self.sent
            .lock()
            .map_err(|e| CoreError::InternalError(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}
