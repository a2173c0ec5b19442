pub mod ws_models;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::marketplace::Marketplace;
use crate::store::TargetKind;
use crate::web::models::ws_models::BatchSummary;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub identifier: String,
    pub kind: TargetKind,
    pub marketplace: Marketplace,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub job_id: Uuid,
    /// False when the request was coalesced onto a job already in flight.
    pub queued: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchTargetDto {
    pub identifier: String,
    pub kind: TargetKind,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckRequest {
    pub targets: Vec<BatchTargetDto>,
    /// When omitted, each target is checked in every marketplace it is
    /// registered in.
    pub marketplaces: Option<Vec<Marketplace>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckResponse {
    pub batch_id: Uuid,
    /// Jobs actually created; duplicates already in flight are skipped.
    pub queued: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    pub settled: u64,
    pub total: u64,
    pub summary: Option<BatchSummary>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PeakStatsQuery {
    pub marketplace: Marketplace,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
