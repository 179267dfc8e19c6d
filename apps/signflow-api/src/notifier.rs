//! Outbound notification seam
//!
//! Email delivery is an external collaborator: the core hands a fully
//! rendered message to a [`Notifier`] and records the per-recipient
//! outcome. Delivery happens after session rows are committed, so a slow
//! or failing sender never holds a transaction open. Retry/queueing
//! belongs to the implementation behind this trait, not to the core.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Development notifier: logs the message instead of delivering it.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(to, subject, body_len = body.len(), "outbound notification");
        Ok(())
    }
}
