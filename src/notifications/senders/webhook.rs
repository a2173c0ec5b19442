use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tera::{Context, Tera};

use super::{NotificationSender, SenderError};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default body posted to the chat webhook; overridable per channel with a
/// Tera template using the same variables.
const DEFAULT_BODY_TEMPLATE: &str =
    r#"{"text": "[varwatch] {{ kind }} {{ identifier }} on {{ marketplace }} is BROKEN: {{ detail }}"}"#;

/// Pushes notifications to a chat webhook (Slack-compatible JSON POST).
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        webhook_url: &str,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let template = if message.is_empty() {
            DEFAULT_BODY_TEMPLATE
        } else {
            message
        };
        let mut tera_context = Context::new();
        for (key, value) in context {
            tera_context.insert(key, value);
        }
        let body = Tera::one_off(template, &tera_context, true)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))?;

        let response = self
            .client
            .post(webhook_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }
        Ok(())
    }
}
