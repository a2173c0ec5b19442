use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, UpdateResult,
    prelude::Expr,
};

use crate::db::entities::{monitor_target, prelude::MonitorTarget};
use crate::marketplace::Marketplace;

/// All targets with monitoring enabled, across every marketplace.
pub async fn get_enabled_targets(
    db: &DatabaseConnection,
) -> Result<Vec<monitor_target::Model>, DbErr> {
    MonitorTarget::find()
        .filter(monitor_target::Column::Enabled.eq(true))
        .order_by_asc(monitor_target::Column::Id)
        .all(db)
        .await
}

pub async fn get_target(
    db: &DatabaseConnection,
    identifier: &str,
    marketplace: Marketplace,
) -> Result<Option<monitor_target::Model>, DbErr> {
    MonitorTarget::find()
        .filter(monitor_target::Column::Identifier.eq(identifier))
        .filter(monitor_target::Column::Marketplace.eq(marketplace.as_str()))
        .one(db)
        .await
}

/// Flips a target's status and stamps the check time in one statement.
pub async fn update_target_status(
    db: &DatabaseConnection,
    identifier: &str,
    marketplace: Marketplace,
    status: &str,
    checked_at: DateTime<Utc>,
) -> Result<UpdateResult, DbErr> {
    MonitorTarget::update_many()
        .col_expr(monitor_target::Column::Status, Expr::value(status))
        .col_expr(
            monitor_target::Column::LastCheckedAt,
            Expr::value(Some(checked_at)),
        )
        .col_expr(monitor_target::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(monitor_target::Column::Identifier.eq(identifier))
        .filter(monitor_target::Column::Marketplace.eq(marketplace.as_str()))
        .exec(db)
        .await
}

/// Bumps the last-check timestamp without touching the status.
pub async fn touch_last_checked(
    db: &DatabaseConnection,
    identifier: &str,
    marketplace: Marketplace,
    checked_at: DateTime<Utc>,
) -> Result<UpdateResult, DbErr> {
    MonitorTarget::update_many()
        .col_expr(
            monitor_target::Column::LastCheckedAt,
            Expr::value(Some(checked_at)),
        )
        .filter(monitor_target::Column::Identifier.eq(identifier))
        .filter(monitor_target::Column::Marketplace.eq(marketplace.as_str()))
        .exec(db)
        .await
}
