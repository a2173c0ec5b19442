use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};

use crate::db::entities::{notification_channel, prelude::NotificationChannel};
use crate::marketplace::Marketplace;

/// Returns the webhook channel configured for one marketplace, if any.
pub async fn get_channel(
    db: &DatabaseConnection,
    marketplace: Marketplace,
) -> Result<Option<notification_channel::Model>, DbErr> {
    NotificationChannel::find()
        .filter(notification_channel::Column::Marketplace.eq(marketplace.as_str()))
        .one(db)
        .await
}
