use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};

use crate::db::entities::monitor_history;
use crate::store::NewHistory;

/// Appends one audit row. History is append-only; retention is handled by a
/// database-side policy, not by this service.
pub async fn append_history(
    db: &DatabaseConnection,
    record: NewHistory,
) -> Result<monitor_history::Model, DbErr> {
    let active = monitor_history::ActiveModel {
        identifier: Set(record.target.identifier),
        kind: Set(record.target.kind.to_string()),
        check_type: Set(record.check_kind.as_str().to_owned()),
        marketplace: Set(record.marketplace.as_str().to_owned()),
        is_broken: Set(record.is_broken),
        checked_at: Set(record.checked_at),
        detail: Set(Some(record.detail)),
        notified: Set(record.notified),
        ..Default::default()
    };
    active.insert(db).await
}
