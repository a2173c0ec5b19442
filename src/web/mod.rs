use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::broadcaster::ProgressBroadcaster;
use crate::config::MonitorConfig;
use crate::marketplace::PeakSchedule;
use crate::monitor::{BatchTracker, TaskQueue};
use crate::store::MonitorStore;
use crate::version::VERSION;

pub mod error;
pub mod models;
pub mod routes;
pub mod websocket_handler;

pub use error::AppError;

pub struct AppState {
    pub queue: Arc<TaskQueue>,
    pub batches: Arc<BatchTracker>,
    pub store: Arc<dyn MonitorStore>,
    pub broadcaster: ProgressBroadcaster,
    pub peak: Arc<PeakSchedule>,
    pub config: MonitorConfig,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/monitor/check", post(routes::monitor_routes::check_target))
        .route("/api/monitor/batch-check", post(routes::monitor_routes::batch_check))
        .route("/api/monitor/jobs/{id}", get(routes::monitor_routes::get_job))
        .route("/api/monitor/batches/{id}", get(routes::monitor_routes::get_batch))
        .route("/api/monitor/peak-stats", get(routes::monitor_routes::peak_stats))
        .route("/ws/monitor", get(websocket_handler::websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": VERSION }))
}
