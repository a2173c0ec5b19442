//! Periodic sweep: every interval, enqueue a scheduled check for every
//! enabled target. Duplicate suppression happens inside the queue, so a sweep
//! that overlaps a still-running predecessor is harmless.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use crate::broadcaster::ProgressBroadcaster;
use crate::store::{CheckKind, MonitorStore};
use crate::web::models::ws_models::WsMessage;

use super::batch::BatchTracker;
use super::queue::TaskQueue;

pub async fn sweep_loop(
    queue: Arc<TaskQueue>,
    store: Arc<dyn MonitorStore>,
    batches: Arc<BatchTracker>,
    broadcaster: ProgressBroadcaster,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately, giving a full sweep at startup.
    loop {
        ticker.tick().await;
        let targets = match store.get_enabled_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(error = %e, "Sweep failed to load targets, will retry next tick.");
                continue;
            }
        };
        if targets.is_empty() {
            info!("Sweep found no enabled targets.");
            continue;
        }

        let total = targets.len();
        let batch_id = Uuid::new_v4();
        // Registered before enqueueing so no settling job can miss the run.
        batches.register(batch_id, total as u64);
        let created = queue.enqueue_batch(
            batch_id,
            targets.into_iter().map(|t| (t.target, t.marketplace)),
            CheckKind::Scheduled,
        );
        if let Some(summary) = batches.discount(batch_id, (total - created) as u64) {
            broadcaster.broadcast(WsMessage::BatchCompleted(summary));
        }
        info!(
            %batch_id,
            targets = total,
            enqueued = created,
            skipped = total - created,
            "Scheduled sweep enqueued."
        );
    }
}
