// Outbound alerts on signals and trades
pub mod webhook;

pub use webhook::WebhookNotifier;

use async_trait::async_trait;

use crate::error::NotifyError;

/// Delivers operator alerts. Callers treat delivery as best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Writes alerts to the log only
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!("📣 {}: {}", subject, body.replace('\n', " | "));
        Ok(())
    }
}

/// Send an alert and swallow any failure
pub async fn notify_best_effort(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.notify(subject, body).await {
        tracing::warn!("Failed to send notification '{}': {}", subject, e);
    }
}
