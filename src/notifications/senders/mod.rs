use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// A trait for delivering one alert message to a chat webhook endpoint.
/// Fire-and-forget from the scheduler's point of view: callers log failures
/// and move on.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends `message` to `webhook_url`. `context` carries the template
    /// variables (identifier, marketplace, detail, ...) for senders that
    /// support body templating.
    async fn send(
        &self,
        webhook_url: &str,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}
