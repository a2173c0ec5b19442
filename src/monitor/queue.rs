//! Shared check-job queue with a global concurrency cap.
//!
//! Job lifecycle: `Pending -> Active -> {Completed | Failed}`, plus
//! `Active -> Pending` when a retryable failure still has job budget.
//! Terminal jobs are retained for a bounded period and pruned lazily.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::marketplace::Marketplace;
use crate::store::{CheckKind, TargetRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// One unit of monitoring work: a target checked in one marketplace.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckJob {
    pub id: Uuid,
    pub target: TargetRef,
    pub marketplace: Marketplace,
    pub check_kind: CheckKind,
    pub force_refresh: bool,
    pub enqueued_at: DateTime<Utc>,
    /// Number of times this job has been handed to a worker.
    pub attempts: u32,
    pub state: JobState,
    pub batch_id: Option<Uuid>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CheckJob {
    /// Dedupe key shared with the request deduplicator.
    pub fn key(&self) -> String {
        job_key(&self.target, self.marketplace)
    }
}

pub fn job_key(target: &TargetRef, marketplace: Marketplace) -> String {
    format!("{}:{}", target.identifier, marketplace)
}

#[derive(Clone, Copy, Debug)]
pub struct EnqueueOptions {
    pub check_kind: CheckKind,
    pub force_refresh: bool,
    pub batch_id: Option<Uuid>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            check_kind: CheckKind::Manual,
            force_refresh: false,
            batch_id: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct QueueConfig {
    /// Hard ceiling on simultaneously active jobs, system-wide.
    pub concurrency_cap: usize,
    /// Executions a single job may consume before it must go terminal.
    pub job_max_attempts: u32,
    pub completed_retention: Duration,
    pub failed_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: 5,
            job_max_attempts: 1,
            completed_retention: Duration::from_secs(60 * 60),
            failed_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<Uuid, CheckJob>,
    pending: VecDeque<Uuid>,
    /// key -> job id, for every non-terminal job. Guarantees at most one
    /// pending-or-active job per target+marketplace.
    keyed: HashMap<String, Uuid>,
    active: usize,
}

pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueues one check. When a pending or active job already exists for
    /// the same target+marketplace, its id is returned instead of creating a
    /// duplicate (this is what keeps overlapping sweeps idempotent).
    pub fn enqueue(
        &self,
        target: TargetRef,
        marketplace: Marketplace,
        options: EnqueueOptions,
    ) -> (Uuid, bool) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        Self::prune_locked(&mut inner, &self.config, now);

        let key = job_key(&target, marketplace);
        if let Some(existing) = inner.keyed.get(&key) {
            debug!(key, job_id = %existing, "Skipping duplicate enqueue.");
            return (*existing, false);
        }

        let job = CheckJob {
            id: Uuid::new_v4(),
            target,
            marketplace,
            check_kind: options.check_kind,
            force_refresh: options.force_refresh,
            enqueued_at: now,
            attempts: 0,
            state: JobState::Pending,
            batch_id: options.batch_id,
            finished_at: None,
        };
        let id = job.id;
        inner.keyed.insert(key, id);
        inner.pending.push_back(id);
        inner.jobs.insert(id, job);
        drop(inner);
        self.notify.notify_one();
        (id, true)
    }

    /// Enqueues a set of target+marketplace pairs under one batch run id.
    /// Returns how many jobs were actually created; duplicates already in
    /// flight are skipped. The caller owns `batch_id` so it can register the
    /// run with the batch tracker before any job becomes claimable.
    pub fn enqueue_batch(
        &self,
        batch_id: Uuid,
        items: impl IntoIterator<Item = (TargetRef, Marketplace)>,
        check_kind: CheckKind,
    ) -> usize {
        let options = EnqueueOptions {
            check_kind,
            force_refresh: false,
            batch_id: Some(batch_id),
        };
        let mut created = 0;
        for (target, marketplace) in items {
            let (_, fresh) = self.enqueue(target, marketplace, options);
            if fresh {
                created += 1;
            }
        }
        created
    }

    /// Hands the next pending job to a worker, respecting the concurrency
    /// cap. `Pending -> Active`; the attempt counter is charged here.
    pub fn claim(&self) -> Option<CheckJob> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if inner.active >= self.config.concurrency_cap {
            return None;
        }
        let id = inner.pending.pop_front()?;
        let job = inner.jobs.get_mut(&id)?;
        job.state = JobState::Active;
        job.attempts += 1;
        let claimed = job.clone();
        inner.active += 1;
        Some(claimed)
    }

    /// `Active -> Pending` for a retryable failure that still has job budget.
    /// Returns false (and fails the job) when the budget is exhausted, so a
    /// job can never be silently dropped.
    pub fn requeue(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let Some(job) = inner.jobs.get_mut(&id) else {
            return false;
        };
        if job.state != JobState::Active {
            return false;
        }
        if job.attempts >= self.config.job_max_attempts {
            Self::finish_locked(&mut inner, id, JobState::Failed);
            drop(inner);
            self.notify.notify_one();
            return false;
        }
        job.state = JobState::Pending;
        inner.active -= 1;
        inner.pending.push_back(id);
        drop(inner);
        self.notify.notify_one();
        true
    }

    pub fn complete(&self, id: Uuid) {
        self.finish(id, JobState::Completed);
    }

    pub fn fail(&self, id: Uuid) {
        self.finish(id, JobState::Failed);
    }

    fn finish(&self, id: Uuid, state: JobState) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        Self::finish_locked(&mut inner, id, state);
        drop(inner);
        // Capacity freed: wake a parked worker.
        self.notify.notify_one();
    }

    fn finish_locked(inner: &mut QueueInner, id: Uuid, state: JobState) {
        let Some(job) = inner.jobs.get_mut(&id) else {
            return;
        };
        let was_active = job.state == JobState::Active;
        job.state = state;
        job.finished_at = Some(Utc::now());
        let key = job.key();
        if was_active {
            inner.active -= 1;
        }
        if inner.keyed.get(&key) == Some(&id) {
            inner.keyed.remove(&key);
        }
    }

    /// Parks the caller until new work or capacity may be available.
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    pub fn job(&self, id: Uuid) -> Option<CheckJob> {
        self.inner
            .lock()
            .expect("queue lock poisoned")
            .jobs
            .get(&id)
            .cloned()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").active
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").pending.len()
    }

    /// Drops terminal jobs past their retention window. Runs inside enqueue,
    /// so an idle queue never grows without bound across sweeps.
    fn prune_locked(inner: &mut QueueInner, config: &QueueConfig, now: DateTime<Utc>) {
        inner.jobs.retain(|_, job| {
            let Some(finished_at) = job.finished_at else {
                return true;
            };
            let retention = match job.state {
                JobState::Completed => config.completed_retention,
                JobState::Failed => config.failed_retention,
                _ => return true,
            };
            let age = now.signed_duration_since(finished_at);
            age.to_std().map(|age| age < retention).unwrap_or(true)
        });
    }
}
