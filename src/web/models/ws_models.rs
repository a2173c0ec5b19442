//! Events pushed to dashboard sessions over the live feed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::marketplace::Marketplace;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAck {
    pub server_version: String,
    pub connected_at: DateTime<Utc>,
}

/// Outcome of one settled check job, as shown on the dashboard.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobVerdict {
    Normal,
    Broken,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckProgress {
    pub job_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub identifier: String,
    pub status: JobVerdict,
    pub marketplace: Marketplace,
    /// Jobs settled so far in this batch (1/1 for standalone checks).
    pub current: u64,
    pub total: u64,
    /// Percentage, 0-100.
    pub progress: u8,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceTally {
    pub checked: u64,
    pub broken: u64,
    pub normal: u64,
    pub failed: u64,
}

/// Summary emitted once every job of a batch run has gone terminal. Also
/// served over HTTP for clients that reconnect mid-run.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: Uuid,
    /// True when no job in the run failed.
    pub success: bool,
    pub total_checked: u64,
    pub total_broken: u64,
    pub total_normal: u64,
    pub total_failed: u64,
    pub duration_ms: u64,
    pub per_marketplace_results: HashMap<Marketplace, MarketplaceTally>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    ConnectionAck(ConnectionAck),
    CheckProgress(CheckProgress),
    BatchCompleted(BatchSummary),
    Heartbeat(Heartbeat),
}
