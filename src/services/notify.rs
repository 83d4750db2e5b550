use async_trait::async_trait;
use tracing::info;

use crate::domain::NotificationEvent;

/// Operator notification channel.
///
/// Best-effort by contract: implementations swallow delivery failures
/// (logging them locally) so a broken channel can never interrupt the
/// retry loop.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotificationEvent);
}

/// Sink used when no operator channel is configured; events only reach
/// the process log.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn notify(&self, event: &NotificationEvent) {
        info!(
            subject = %event.subject,
            attempt = ?event.trigger_attempt,
            "notification (no sink configured): {}",
            event.body
        );
    }
}
