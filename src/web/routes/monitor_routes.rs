use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::info;
use uuid::Uuid;

use crate::marketplace::TimeRangeStats;
use crate::monitor::queue::EnqueueOptions;
use crate::store::{CheckKind, TargetRef};
use crate::web::AppState;
use crate::web::error::AppError;
use crate::web::models::{
    BatchCheckRequest, BatchCheckResponse, BatchStatusResponse, CheckRequest, CheckResponse,
    PeakStatsQuery,
};
use crate::web::models::ws_models::WsMessage;

/// POST /api/monitor/check
pub async fn check_target(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, AppError> {
    if payload.identifier.trim().is_empty() {
        return Err(AppError::InvalidInput("identifier must not be empty".to_string()));
    }
    let target = state
        .store
        .get_target(&payload.identifier, payload.marketplace)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "target {} is not registered in {}",
                payload.identifier, payload.marketplace
            ))
        })?;
    if target.target.kind != payload.kind {
        return Err(AppError::InvalidInput(format!(
            "target {} is registered as {}, not {}",
            payload.identifier, target.target.kind, payload.kind
        )));
    }

    let (job_id, queued) = state.queue.enqueue(
        TargetRef {
            identifier: payload.identifier,
            kind: payload.kind,
        },
        payload.marketplace,
        EnqueueOptions {
            check_kind: CheckKind::Manual,
            force_refresh: payload.force_refresh,
            batch_id: None,
        },
    );
    Ok(Json(CheckResponse { job_id, queued }))
}

/// POST /api/monitor/batch-check
pub async fn batch_check(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchCheckRequest>,
) -> Result<Json<BatchCheckResponse>, AppError> {
    if payload.targets.is_empty() {
        return Err(AppError::InvalidInput("targets must not be empty".to_string()));
    }

    // Explicit marketplaces give the full cross product; otherwise each
    // target runs in every marketplace it is registered in.
    let mut items: Vec<(TargetRef, crate::marketplace::Marketplace)> = Vec::new();
    match &payload.marketplaces {
        Some(marketplaces) => {
            if marketplaces.is_empty() {
                return Err(AppError::InvalidInput(
                    "marketplaces must not be empty when present".to_string(),
                ));
            }
            for target in &payload.targets {
                for marketplace in marketplaces {
                    items.push((
                        TargetRef {
                            identifier: target.identifier.clone(),
                            kind: target.kind,
                        },
                        *marketplace,
                    ));
                }
            }
        }
        None => {
            let enabled = state.store.get_enabled_targets().await?;
            for target in &payload.targets {
                for registered in enabled
                    .iter()
                    .filter(|t| t.target.identifier == target.identifier)
                {
                    items.push((registered.target.clone(), registered.marketplace));
                }
            }
            if items.is_empty() {
                return Err(AppError::NotFound(
                    "none of the requested targets are registered".to_string(),
                ));
            }
        }
    }

    let total = items.len();
    let batch_id = Uuid::new_v4();
    state.batches.register(batch_id, total as u64);
    let queued = state
        .queue
        .enqueue_batch(batch_id, items, CheckKind::Manual);
    if let Some(summary) = state.batches.discount(batch_id, (total - queued) as u64) {
        state.broadcaster.broadcast(WsMessage::BatchCompleted(summary));
    }
    info!(%batch_id, requested = total, queued, "Manual batch check accepted.");
    Ok(Json(BatchCheckResponse { batch_id, queued }))
}

/// GET /api/monitor/jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::monitor::CheckJob>, AppError> {
    state
        .queue
        .job(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("unknown job: {id}")))
}

/// GET /api/monitor/batches/{id}
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchStatusResponse>, AppError> {
    let (settled, total) = state
        .batches
        .progress(id)
        .ok_or_else(|| AppError::NotFound(format!("unknown batch: {id}")))?;
    Ok(Json(BatchStatusResponse {
        batch_id: id,
        settled,
        total,
        summary: state.batches.summary(id),
    }))
}

/// GET /api/monitor/peak-stats
pub async fn peak_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeakStatsQuery>,
) -> Result<Json<TimeRangeStats>, AppError> {
    if query.end < query.start {
        return Err(AppError::InvalidInput(
            "end must not precede start".to_string(),
        ));
    }
    Ok(Json(state.peak.time_range_stats(
        query.start,
        query.end,
        query.marketplace,
    )))
}
