//! The persistence surface consumed by the scheduler core.
//!
//! Targets, history rows and notification channels are owned by the CRUD side
//! of the system; the scheduler only reads targets, bumps status/last-check
//! fields and appends history. The seam is a trait so the worker pool can be
//! constructed against an in-memory store in tests.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::marketplace::Marketplace;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("target not found: {0}")]
    TargetNotFound(String),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// What kind of listing a monitored identifier refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    VariantGroup,
    Asin,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::VariantGroup => "variant_group",
            TargetKind::Asin => "asin",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variant_group" => Ok(TargetKind::VariantGroup),
            "asin" => Ok(TargetKind::Asin),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

/// Reference to a monitored listing, independent of marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub identifier: String,
    pub kind: TargetKind,
}

impl TargetRef {
    pub fn group(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: TargetKind::VariantGroup,
        }
    }

    pub fn asin(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: TargetKind::Asin,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetStatus {
    Normal,
    Broken,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Normal => "NORMAL",
            TargetStatus::Broken => "BROKEN",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(TargetStatus::Normal),
            "BROKEN" => Ok(TargetStatus::Broken),
            other => Err(format!("unknown target status: {other}")),
        }
    }
}

/// A monitored listing in one marketplace, as the scheduler sees it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(flatten)]
    pub target: TargetRef,
    pub marketplace: Marketplace,
    pub status: TargetStatus,
    pub notify_enabled: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Whether a check was produced by the recurring sweep or an operator action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Scheduled,
    Manual,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Scheduled => "scheduled",
            CheckKind::Manual => "manual",
        }
    }
}

/// Append-only audit record written after every completed check job.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistory {
    pub target: TargetRef,
    pub check_kind: CheckKind,
    pub marketplace: Marketplace,
    pub is_broken: bool,
    pub checked_at: DateTime<Utc>,
    pub detail: serde_json::Value,
    pub notified: bool,
}

/// Per-marketplace chat webhook configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: String,
    pub enabled: bool,
    pub body_template: Option<String>,
}

#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// All targets with monitoring enabled, across every marketplace.
    async fn get_enabled_targets(&self) -> Result<Vec<Target>, StoreError>;

    async fn get_target(
        &self,
        identifier: &str,
        marketplace: Marketplace,
    ) -> Result<Option<Target>, StoreError>;

    /// Flips a target's status. Only called on an actual transition.
    async fn update_target_status(
        &self,
        identifier: &str,
        marketplace: Marketplace,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Bumps the last-check timestamp without touching the status.
    async fn touch_last_checked(
        &self,
        identifier: &str,
        marketplace: Marketplace,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn append_history(&self, record: NewHistory) -> Result<(), StoreError>;

    async fn notification_config(
        &self,
        marketplace: Marketplace,
    ) -> Result<Option<NotificationConfig>, StoreError>;
}
