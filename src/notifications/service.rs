//! Resolves the per-marketplace webhook channel and dispatches break alerts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::marketplace::Marketplace;
use crate::store::{MonitorStore, TargetRef};

use super::senders::NotificationSender;

pub struct NotificationGateway {
    store: Arc<dyn MonitorStore>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationGateway {
    pub fn new(store: Arc<dyn MonitorStore>, sender: Arc<dyn NotificationSender>) -> Self {
        Self { store, sender }
    }

    /// Sends the break alert for one target, if the marketplace has an
    /// enabled channel. Returns whether a notification actually went out.
    ///
    /// Delivery problems are logged and swallowed here: a webhook outage must
    /// never fail the check job or roll back a status update.
    pub async fn notify_broken(
        &self,
        target: &TargetRef,
        marketplace: Marketplace,
        detail: &str,
        checked_at: DateTime<Utc>,
    ) -> bool {
        let config = match self.store.notification_config(marketplace).await {
            Ok(Some(config)) if config.enabled => config,
            Ok(_) => {
                info!(%marketplace, "No enabled notification channel, skipping alert.");
                return false;
            }
            Err(e) => {
                warn!(%marketplace, error = %e, "Failed to load notification channel.");
                return false;
            }
        };

        let mut context = HashMap::new();
        context.insert("identifier".to_string(), target.identifier.clone());
        context.insert("kind".to_string(), target.kind.to_string());
        context.insert("marketplace".to_string(), marketplace.to_string());
        context.insert("detail".to_string(), detail.to_string());
        context.insert("checked_at".to_string(), checked_at.to_rfc3339());

        let message = config.body_template.as_deref().unwrap_or("");
        match self
            .sender
            .send(&config.webhook_url, message, &context)
            .await
        {
            Ok(()) => {
                info!(
                    identifier = %target.identifier,
                    %marketplace,
                    "Break notification delivered."
                );
                true
            }
            Err(e) => {
                warn!(
                    identifier = %target.identifier,
                    %marketplace,
                    error = %e,
                    "Break notification failed; check result is unaffected."
                );
                false
            }
        }
    }
}
