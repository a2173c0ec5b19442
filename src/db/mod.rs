//! SeaORM-backed persistence: entities, query services and the `DbStore`
//! adapter that exposes them through the [`MonitorStore`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::marketplace::Marketplace;
use crate::store::{
    MonitorStore, NewHistory, NotificationConfig, StoreError, Target, TargetRef, TargetStatus,
};

pub mod entities;
pub mod services;

pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_target(model: entities::monitor_target::Model) -> Result<Target, StoreError> {
    let kind = model
        .kind
        .parse()
        .map_err(StoreError::InvalidValue)?;
    let marketplace: Marketplace = model
        .marketplace
        .parse()
        .map_err(StoreError::InvalidValue)?;
    let status: TargetStatus = model
        .status
        .parse()
        .map_err(StoreError::InvalidValue)?;
    Ok(Target {
        target: TargetRef {
            identifier: model.identifier,
            kind,
        },
        marketplace,
        status,
        notify_enabled: model.notify_enabled,
        last_checked_at: model.last_checked_at,
    })
}

#[async_trait]
impl MonitorStore for DbStore {
    async fn get_enabled_targets(&self) -> Result<Vec<Target>, StoreError> {
        let models = services::target_service::get_enabled_targets(&self.db).await?;
        models.into_iter().map(model_to_target).collect()
    }

    async fn get_target(
        &self,
        identifier: &str,
        marketplace: Marketplace,
    ) -> Result<Option<Target>, StoreError> {
        let model = services::target_service::get_target(&self.db, identifier, marketplace).await?;
        model.map(model_to_target).transpose()
    }

    async fn update_target_status(
        &self,
        identifier: &str,
        marketplace: Marketplace,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = services::target_service::update_target_status(
            &self.db,
            identifier,
            marketplace,
            status.as_str(),
            checked_at,
        )
        .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::TargetNotFound(format!(
                "{identifier}:{marketplace}"
            )));
        }
        Ok(())
    }

    async fn touch_last_checked(
        &self,
        identifier: &str,
        marketplace: Marketplace,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        services::target_service::touch_last_checked(&self.db, identifier, marketplace, checked_at)
            .await?;
        Ok(())
    }

    async fn append_history(&self, record: NewHistory) -> Result<(), StoreError> {
        services::history_service::append_history(&self.db, record).await?;
        Ok(())
    }

    async fn notification_config(
        &self,
        marketplace: Marketplace,
    ) -> Result<Option<NotificationConfig>, StoreError> {
        let channel =
            services::notification_channel_service::get_channel(&self.db, marketplace).await?;
        Ok(channel.map(|c| NotificationConfig {
            webhook_url: c.webhook_url,
            enabled: c.enabled,
            body_template: c.body_template,
        }))
    }
}
