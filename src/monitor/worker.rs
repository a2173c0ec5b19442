//! Worker pool draining the task queue.
//!
//! Each worker loops claim -> execute -> settle. Execution goes through the
//! request deduplicator and the retry executor; settling persists a history
//! row, updates the target on a status change, triggers the notification
//! gateway on a transition into BROKEN, and emits progress events.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broadcaster::ProgressBroadcaster;
use crate::notifications::NotificationGateway;
use crate::provider::{CatalogProvider, CatalogStatus};
use crate::store::{MonitorStore, NewHistory, TargetStatus};
use crate::web::models::ws_models::{CheckProgress, JobVerdict, WsMessage};

use super::batch::BatchTracker;
use super::dedupe::RequestDeduplicator;
use super::queue::{CheckJob, TaskQueue};
use super::retry::{RetryError, RetryExecutor};

/// Shared result type flowing through the deduplicator: joiners of an
/// in-flight check receive a clone of the executing call's outcome.
pub type ExecutionResult = Result<CatalogStatus, RetryError>;

pub struct MonitorWorkerPool {
    queue: Arc<TaskQueue>,
    batches: Arc<BatchTracker>,
    dedupe: Arc<RequestDeduplicator<ExecutionResult>>,
    retry: RetryExecutor,
    provider: Arc<dyn CatalogProvider>,
    store: Arc<dyn MonitorStore>,
    gateway: Arc<NotificationGateway>,
    broadcaster: ProgressBroadcaster,
    concurrency: usize,
}

impl MonitorWorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<TaskQueue>,
        batches: Arc<BatchTracker>,
        dedupe: Arc<RequestDeduplicator<ExecutionResult>>,
        retry: RetryExecutor,
        provider: Arc<dyn CatalogProvider>,
        store: Arc<dyn MonitorStore>,
        gateway: Arc<NotificationGateway>,
        broadcaster: ProgressBroadcaster,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            batches,
            dedupe,
            retry,
            provider,
            store,
            gateway,
            broadcaster,
            concurrency,
        }
    }

    /// Spawns the worker tasks. The pool keeps running until the handles are
    /// aborted; there is no mid-flight batch cancellation.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.concurrency);
        for worker_id in 0..self.concurrency {
            let pool = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                info!(worker_id, "Monitor worker started.");
                pool.worker_loop().await;
            }));
        }
        handles
    }

    async fn worker_loop(&self) {
        loop {
            // Arm the notification before claiming so an enqueue between a
            // failed claim and the await cannot be lost.
            let parked = self.queue.wait_for_work();
            if let Some(job) = self.queue.claim() {
                self.run_job(job).await;
                continue;
            }
            parked.await;
        }
    }

    async fn run_job(&self, job: CheckJob) {
        let key = job.key();
        let provider = Arc::clone(&self.provider);
        let retry = self.retry.clone();
        let target = job.target.clone();
        let marketplace = job.marketplace;
        let fetch = async move {
            retry
                .execute(|| provider.fetch_catalog_status(&target, marketplace))
                .await
        };

        // A forced refresh never piggybacks on an in-flight lookup.
        let result = if job.force_refresh {
            fetch.await
        } else {
            self.dedupe.dedupe(&key, fetch).await
        };

        match result {
            Ok(status) => self.settle_success(&job, status).await,
            Err(err) => self.settle_failure(&job, err).await,
        }
    }

    async fn settle_success(&self, job: &CheckJob, status: CatalogStatus) {
        let checked_at = Utc::now();
        let new_status = if status.is_broken {
            TargetStatus::Broken
        } else {
            TargetStatus::Normal
        };

        let current = match self
            .store
            .get_target(&job.target.identifier, job.marketplace)
            .await
        {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!(
                    identifier = %job.target.identifier,
                    marketplace = %job.marketplace,
                    "Target vanished from the store while being checked."
                );
                self.queue.fail(job.id);
                self.emit_progress(job, JobVerdict::Failed);
                return;
            }
            Err(e) => {
                error!(
                    identifier = %job.target.identifier,
                    error = %e,
                    "Failed to load target; marking job failed."
                );
                self.queue.fail(job.id);
                self.emit_progress(job, JobVerdict::Failed);
                return;
            }
        };

        let changed = current.status != new_status;
        let mut notified = false;

        if changed {
            if let Err(e) = self
                .store
                .update_target_status(
                    &job.target.identifier,
                    job.marketplace,
                    new_status,
                    checked_at,
                )
                .await
            {
                error!(
                    identifier = %job.target.identifier,
                    error = %e,
                    "Failed to persist status transition."
                );
            } else {
                info!(
                    identifier = %job.target.identifier,
                    marketplace = %job.marketplace,
                    from = %current.status,
                    to = %new_status,
                    "Target status changed."
                );
            }
            // Notify only on the transition into BROKEN; a target that stays
            // broken across sweeps does not re-alert.
            if new_status == TargetStatus::Broken && current.notify_enabled {
                let detail = format!(
                    "variation relationship broken (provider status {})",
                    status.status_code
                );
                notified = self
                    .gateway
                    .notify_broken(&job.target, job.marketplace, &detail, checked_at)
                    .await;
            }
        } else if let Err(e) = self
            .store
            .touch_last_checked(&job.target.identifier, job.marketplace, checked_at)
            .await
        {
            warn!(
                identifier = %job.target.identifier,
                error = %e,
                "Failed to bump last-check timestamp."
            );
        }

        let detail = json!({
            "statusCode": status.status_code,
            "latencyMs": status.latency_ms,
            "payload": status.payload,
        });
        self.append_history(job, status.is_broken, detail, notified)
            .await;

        self.queue.complete(job.id);
        let verdict = if status.is_broken {
            JobVerdict::Broken
        } else {
            JobVerdict::Normal
        };
        self.emit_progress(job, verdict);
    }

    async fn settle_failure(&self, job: &CheckJob, err: RetryError) {
        // A transient failure with remaining job budget goes back to PENDING
        // instead of terminating; no history row or event until terminal.
        if err.is_transient() && self.queue.requeue(job.id) {
            warn!(
                identifier = %job.target.identifier,
                marketplace = %job.marketplace,
                attempt = job.attempts,
                error = %err,
                "Check failed transiently; job re-enqueued."
            );
            return;
        }

        // Terminal failure: the target's last-known status is left untouched.
        // A provider outage must not overwrite good state with ambiguity.
        error!(
            identifier = %job.target.identifier,
            marketplace = %job.marketplace,
            error = %err,
            "Check failed after exhausting retries."
        );
        let detail = json!({
            "error": err.last.message,
            "classification": err.last.kind,
            "providerStatus": err.last.status,
            "attempts": err.attempts,
        });
        self.append_history(job, false, detail, false).await;
        self.queue.fail(job.id);
        self.emit_progress(job, JobVerdict::Failed);
    }

    async fn append_history(
        &self,
        job: &CheckJob,
        is_broken: bool,
        detail: serde_json::Value,
        notified: bool,
    ) {
        let record = NewHistory {
            target: job.target.clone(),
            check_kind: job.check_kind,
            marketplace: job.marketplace,
            is_broken,
            checked_at: Utc::now(),
            detail,
            notified,
        };
        if let Err(e) = self.store.append_history(record).await {
            error!(
                identifier = %job.target.identifier,
                error = %e,
                "Failed to append monitor history."
            );
        }
    }

    /// Per-job progress event, then the batch-completion summary when this
    /// was the last outstanding job of its run.
    fn emit_progress(&self, job: &CheckJob, verdict: JobVerdict) {
        let summary = job
            .batch_id
            .and_then(|batch_id| self.batches.record(batch_id, job.marketplace, verdict));
        let (current, total) = job
            .batch_id
            .and_then(|batch_id| self.batches.progress(batch_id))
            .unwrap_or((1, 1));

        self.broadcaster
            .broadcast(WsMessage::CheckProgress(CheckProgress {
                job_id: job.id,
                batch_id: job.batch_id,
                identifier: job.target.identifier.clone(),
                status: verdict,
                marketplace: job.marketplace,
                current,
                total,
                progress: ((current * 100) / total.max(1)) as u8,
            }));

        if let Some(summary) = summary {
            info!(
                batch_id = %summary.batch_id,
                total_checked = summary.total_checked,
                total_broken = summary.total_broken,
                duration_ms = summary.duration_ms,
                "Batch run completed."
            );
            self.broadcaster.broadcast(WsMessage::BatchCompleted(summary));
        }
    }
}
