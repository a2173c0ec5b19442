//! Tracks batch runs until every one of their jobs reaches a terminal state.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::marketplace::Marketplace;
use crate::web::models::ws_models::{BatchSummary, JobVerdict, MarketplaceTally};

#[derive(Debug)]
struct BatchRun {
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    total: u64,
    remaining: u64,
    per_marketplace: HashMap<Marketplace, MarketplaceTally>,
    /// Populated once the run completes; kept around so reconnecting clients
    /// can fetch the latest summary on demand.
    summary: Option<BatchSummary>,
    finished_at: Option<Instant>,
}

pub struct BatchTracker {
    runs: DashMap<Uuid, BatchRun>,
    /// How long a completed run's summary stays queryable.
    summary_retention: Duration,
}

impl BatchTracker {
    pub fn new(summary_retention: Duration) -> Self {
        Self {
            runs: DashMap::new(),
            summary_retention,
        }
    }

    pub fn register(&self, batch_id: Uuid, total: u64) {
        self.prune();
        if total == 0 {
            return;
        }
        self.runs.insert(
            batch_id,
            BatchRun {
                started_at: Instant::now(),
                started_at_utc: Utc::now(),
                total,
                remaining: total,
                per_marketplace: HashMap::new(),
                summary: None,
                finished_at: None,
            },
        );
    }

    /// Records a terminal job. Returns the batch summary when this was the
    /// last outstanding job of the run.
    pub fn record(
        &self,
        batch_id: Uuid,
        marketplace: Marketplace,
        verdict: JobVerdict,
    ) -> Option<BatchSummary> {
        let mut run = self.runs.get_mut(&batch_id)?;
        let tally = run.per_marketplace.entry(marketplace).or_default();
        tally.checked += 1;
        match verdict {
            JobVerdict::Normal => tally.normal += 1,
            JobVerdict::Broken => tally.broken += 1,
            JobVerdict::Failed => tally.failed += 1,
        }
        run.remaining = run.remaining.saturating_sub(1);
        if run.remaining > 0 {
            return None;
        }
        Some(Self::finalize(&mut run, batch_id))
    }

    /// Shrinks a run whose enqueue skipped duplicates already in flight.
    /// Callers register with the requested total before enqueueing (so no
    /// settling job can miss the run) and discount the skipped count after.
    /// Returns the summary when the discount settles the last open slot.
    pub fn discount(&self, batch_id: Uuid, skipped: u64) -> Option<BatchSummary> {
        if skipped == 0 {
            return None;
        }
        let mut run = self.runs.get_mut(&batch_id)?;
        run.total = run.total.saturating_sub(skipped);
        run.remaining = run.remaining.saturating_sub(skipped);
        if run.total == 0 {
            drop(run);
            self.runs.remove(&batch_id);
            return None;
        }
        if run.remaining > 0 {
            return None;
        }
        Some(Self::finalize(&mut run, batch_id))
    }

    fn finalize(run: &mut BatchRun, batch_id: Uuid) -> BatchSummary {
        let totals = run.per_marketplace.values().fold(
            MarketplaceTally::default(),
            |mut acc, tally| {
                acc.checked += tally.checked;
                acc.broken += tally.broken;
                acc.normal += tally.normal;
                acc.failed += tally.failed;
                acc
            },
        );
        let summary = BatchSummary {
            batch_id,
            success: totals.failed == 0,
            total_checked: totals.checked,
            total_broken: totals.broken,
            total_normal: totals.normal,
            total_failed: totals.failed,
            duration_ms: run.started_at.elapsed().as_millis() as u64,
            per_marketplace_results: run.per_marketplace.clone(),
        };
        run.summary = Some(summary.clone());
        run.finished_at = Some(Instant::now());
        summary
    }

    /// Settled/total counters for per-job progress events.
    pub fn progress(&self, batch_id: Uuid) -> Option<(u64, u64)> {
        let run = self.runs.get(&batch_id)?;
        Some((run.total - run.remaining, run.total))
    }

    /// Latest known summary of a finished run, if still retained.
    pub fn summary(&self, batch_id: Uuid) -> Option<BatchSummary> {
        self.runs.get(&batch_id).and_then(|run| run.summary.clone())
    }

    pub fn started_at(&self, batch_id: Uuid) -> Option<DateTime<Utc>> {
        self.runs.get(&batch_id).map(|run| run.started_at_utc)
    }

    fn prune(&self) {
        self.runs.retain(|_, run| {
            run.finished_at
                .map(|finished| finished.elapsed() < self.summary_retention)
                .unwrap_or(true)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_fires_only_on_the_last_terminal_job() {
        let tracker = BatchTracker::new(Duration::from_secs(600));
        let id = Uuid::new_v4();
        tracker.register(id, 3);

        assert!(tracker.record(id, Marketplace::Us, JobVerdict::Normal).is_none());
        assert!(tracker.record(id, Marketplace::Us, JobVerdict::Normal).is_none());
        assert_eq!(tracker.progress(id), Some((2, 3)));

        let summary = tracker
            .record(id, Marketplace::Us, JobVerdict::Broken)
            .expect("last job completes the batch");
        assert_eq!(summary.total_checked, 3);
        assert_eq!(summary.total_normal, 2);
        assert_eq!(summary.total_broken, 1);
        assert_eq!(summary.total_failed, 0);
        assert!(summary.success);

        // Latest summary stays queryable for reconnecting clients.
        assert_eq!(tracker.summary(id).unwrap().total_checked, 3);
    }

    #[test]
    fn failed_jobs_mark_the_run_unsuccessful() {
        let tracker = BatchTracker::new(Duration::from_secs(600));
        let id = Uuid::new_v4();
        tracker.register(id, 2);
        tracker.record(id, Marketplace::Us, JobVerdict::Failed);
        let summary = tracker.record(id, Marketplace::De, JobVerdict::Normal).unwrap();
        assert!(!summary.success);
        assert_eq!(summary.total_failed, 1);
        let us = summary.per_marketplace_results[&Marketplace::Us];
        assert_eq!(us.failed, 1);
        assert_eq!(us.checked, 1);
    }

    #[test]
    fn discount_can_settle_a_run_after_skipped_duplicates() {
        let tracker = BatchTracker::new(Duration::from_secs(600));
        let id = Uuid::new_v4();
        tracker.register(id, 3);

        // Two jobs settle while the enqueue is still figuring out that the
        // third was a duplicate already in flight.
        assert!(tracker.record(id, Marketplace::Us, JobVerdict::Normal).is_none());
        assert!(tracker.record(id, Marketplace::Us, JobVerdict::Broken).is_none());

        let summary = tracker.discount(id, 1).expect("discount settles the run");
        assert_eq!(summary.total_checked, 2);
        assert_eq!(summary.total_broken, 1);

        // A run whose every job was a duplicate simply disappears.
        let empty = Uuid::new_v4();
        tracker.register(empty, 2);
        assert!(tracker.discount(empty, 2).is_none());
        assert!(tracker.progress(empty).is_none());
    }

    #[test]
    fn empty_batches_are_not_registered() {
        let tracker = BatchTracker::new(Duration::from_secs(600));
        let id = Uuid::new_v4();
        tracker.register(id, 0);
        assert!(tracker.progress(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_runs_are_pruned_after_retention() {
        let tracker = BatchTracker::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        tracker.register(id, 1);
        tracker.record(id, Marketplace::Us, JobVerdict::Normal);
        assert!(tracker.summary(id).is_some());

        tokio::time::sleep(Duration::from_secs(61)).await;
        tracker.register(Uuid::new_v4(), 1);
        assert!(tracker.summary(id).is_none());
    }
}
