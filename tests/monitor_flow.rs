//! End-to-end scheduler flow against in-memory fakes: queue, workers, retry,
//! deduplication, history, notifications and the progress feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use varwatch::broadcaster::ProgressBroadcaster;
use varwatch::marketplace::Marketplace;
use varwatch::monitor::queue::{EnqueueOptions, JobState, QueueConfig};
use varwatch::monitor::retry::{RetryExecutor, RetryPolicy};
use varwatch::monitor::{BatchTracker, MonitorWorkerPool, RequestDeduplicator, TaskQueue};
use varwatch::notifications::NotificationGateway;
use varwatch::notifications::senders::{NotificationSender, SenderError};
use varwatch::provider::{CatalogProvider, CatalogStatus, ProviderError};
use varwatch::store::{
    MonitorStore, NewHistory, NotificationConfig, StoreError, Target, TargetRef, TargetStatus,
};
use varwatch::web::models::ws_models::{JobVerdict, WsMessage};

use uuid::Uuid;

#[derive(Default)]
struct MemoryStore {
    targets: Mutex<HashMap<(String, Marketplace), Target>>,
    history: Mutex<Vec<NewHistory>>,
    status_updates: AtomicU32,
    channel: Option<NotificationConfig>,
}

impl MemoryStore {
    fn with_channel() -> Self {
        Self {
            channel: Some(NotificationConfig {
                webhook_url: "http://hooks.example/abc".to_string(),
                enabled: true,
                body_template: None,
            }),
            ..Self::default()
        }
    }

    fn insert(&self, target: Target) {
        self.targets.lock().unwrap().insert(
            (target.target.identifier.clone(), target.marketplace),
            target,
        );
    }

    fn history_rows(&self) -> Vec<NewHistory> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn get_enabled_targets(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.targets.lock().unwrap().values().cloned().collect())
    }

    async fn get_target(
        &self,
        identifier: &str,
        marketplace: Marketplace,
    ) -> Result<Option<Target>, StoreError> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .get(&(identifier.to_string(), marketplace))
            .cloned())
    }

    async fn update_target_status(
        &self,
        identifier: &str,
        marketplace: Marketplace,
        status: TargetStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .get_mut(&(identifier.to_string(), marketplace))
            .ok_or_else(|| StoreError::TargetNotFound(identifier.to_string()))?;
        target.status = status;
        target.last_checked_at = Some(checked_at);
        Ok(())
    }

    async fn touch_last_checked(
        &self,
        identifier: &str,
        marketplace: Marketplace,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut targets = self.targets.lock().unwrap();
        if let Some(target) = targets.get_mut(&(identifier.to_string(), marketplace)) {
            target.last_checked_at = Some(checked_at);
        }
        Ok(())
    }

    async fn append_history(&self, record: NewHistory) -> Result<(), StoreError> {
        self.history.lock().unwrap().push(record);
        Ok(())
    }

    async fn notification_config(
        &self,
        _marketplace: Marketplace,
    ) -> Result<Option<NotificationConfig>, StoreError> {
        Ok(self.channel.clone())
    }
}

#[derive(Clone, Copy)]
enum Scripted {
    Normal,
    Broken,
    Timeout,
}

struct FakeProvider {
    outcomes: HashMap<String, Scripted>,
    calls: AtomicU32,
}

impl FakeProvider {
    fn new(outcomes: impl IntoIterator<Item = (&'static str, Scripted)>) -> Self {
        Self {
            outcomes: outcomes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CatalogProvider for FakeProvider {
    async fn fetch_catalog_status(
        &self,
        target: &TargetRef,
        marketplace: Marketplace,
    ) -> Result<CatalogStatus, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.get(&target.identifier) {
            Some(Scripted::Broken) => Ok(CatalogStatus {
                identifier: target.identifier.clone(),
                marketplace,
                is_broken: true,
                status_code: 200,
                latency_ms: 12,
                payload: None,
            }),
            Some(Scripted::Timeout) => Err(ProviderError::transient("request timed out")),
            _ => Ok(CatalogStatus {
                identifier: target.identifier.clone(),
                marketplace,
                is_broken: false,
                status_code: 200,
                latency_ms: 8,
                payload: None,
            }),
        }
    }
}

#[derive(Default)]
struct CountingSender {
    sent: AtomicU32,
}

#[async_trait]
impl NotificationSender for CountingSender {
    async fn send(
        &self,
        _webhook_url: &str,
        _message: &str,
        _context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    queue: Arc<TaskQueue>,
    batches: Arc<BatchTracker>,
    store: Arc<MemoryStore>,
    provider: Arc<FakeProvider>,
    sender: Arc<CountingSender>,
    broadcaster: ProgressBroadcaster,
    pool: Arc<MonitorWorkerPool>,
}

fn harness(store: MemoryStore, provider: FakeProvider) -> Harness {
    let queue = Arc::new(TaskQueue::new(QueueConfig::default()));
    let batches = Arc::new(BatchTracker::new(Duration::from_secs(600)));
    let dedupe = Arc::new(RequestDeduplicator::new(Duration::from_secs(5)));
    let retry = RetryExecutor::new(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(5),
        jitter_ratio: 0.0,
    });
    let store = Arc::new(store);
    let provider = Arc::new(provider);
    let sender = Arc::new(CountingSender::default());
    let broadcaster = ProgressBroadcaster::new(64);
    let gateway = Arc::new(NotificationGateway::new(
        store.clone() as Arc<dyn MonitorStore>,
        sender.clone() as Arc<dyn NotificationSender>,
    ));
    let pool = Arc::new(MonitorWorkerPool::new(
        Arc::clone(&queue),
        Arc::clone(&batches),
        dedupe,
        retry,
        provider.clone() as Arc<dyn CatalogProvider>,
        store.clone() as Arc<dyn MonitorStore>,
        gateway,
        broadcaster.clone(),
        3,
    ));
    Harness {
        queue,
        batches,
        store,
        provider,
        sender,
        broadcaster,
        pool,
    }
}

fn normal_target(identifier: &str, marketplace: Marketplace) -> Target {
    Target {
        target: TargetRef::group(identifier),
        marketplace,
        status: TargetStatus::Normal,
        notify_enabled: true,
        last_checked_at: None,
    }
}

#[tokio::test(start_paused = true)]
async fn batch_sweep_flips_one_target_and_notifies_once() {
    let store = MemoryStore::with_channel();
    store.insert(normal_target("G-AAA", Marketplace::Us));
    store.insert(normal_target("G-BBB", Marketplace::Us));
    store.insert(normal_target("G-CCC", Marketplace::Us));
    let provider = FakeProvider::new([
        ("G-AAA", Scripted::Normal),
        ("G-BBB", Scripted::Normal),
        ("G-CCC", Scripted::Broken),
    ]);
    let h = harness(store, provider);
    let mut rx = h.broadcaster.subscribe();
    let handles = h.pool.start();

    let targets = h.store.get_enabled_targets().await.unwrap();
    let batch_id = Uuid::new_v4();
    h.batches.register(batch_id, targets.len() as u64);
    let created = h.queue.enqueue_batch(
        batch_id,
        targets.into_iter().map(|t| (t.target, t.marketplace)),
        varwatch::store::CheckKind::Scheduled,
    );
    assert_eq!(created, 3);

    let summary = loop {
        match rx.recv().await.unwrap() {
            WsMessage::BatchCompleted(summary) => break summary,
            WsMessage::CheckProgress(progress) => {
                assert_eq!(progress.batch_id, Some(batch_id));
                assert_eq!(progress.total, 3);
            }
            _ => {}
        }
    };
    for handle in handles {
        handle.abort();
    }

    assert_eq!(summary.total_checked, 3);
    assert_eq!(summary.total_normal, 2);
    assert_eq!(summary.total_broken, 1);
    assert_eq!(summary.total_failed, 0);
    assert!(summary.success);
    let us = summary.per_marketplace_results[&Marketplace::Us];
    assert_eq!(us.checked, 3);

    // One history row per job, exactly one status transition, one alert.
    assert_eq!(h.store.history_rows().len(), 3);
    assert_eq!(h.store.status_updates.load(Ordering::SeqCst), 1);
    assert_eq!(h.sender.sent.load(Ordering::SeqCst), 1);
    let broken = h
        .store
        .get_target("G-CCC", Marketplace::Us)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(broken.status, TargetStatus::Broken);
    let notified_rows: Vec<_> = h
        .store
        .history_rows()
        .into_iter()
        .filter(|r| r.notified)
        .collect();
    assert_eq!(notified_rows.len(), 1);
    assert_eq!(notified_rows[0].target.identifier, "G-CCC");
}

#[tokio::test(start_paused = true)]
async fn persistent_timeouts_fail_the_job_without_touching_status() {
    let store = MemoryStore::with_channel();
    store.insert(normal_target("G-TTT", Marketplace::De));
    let provider = FakeProvider::new([("G-TTT", Scripted::Timeout)]);
    let h = harness(store, provider);
    let mut rx = h.broadcaster.subscribe();
    let handles = h.pool.start();

    let (job_id, queued) = h.queue.enqueue(
        TargetRef::group("G-TTT"),
        Marketplace::De,
        EnqueueOptions::default(),
    );
    assert!(queued);

    let progress = loop {
        if let WsMessage::CheckProgress(progress) = rx.recv().await.unwrap() {
            break progress;
        }
    };
    for handle in handles {
        handle.abort();
    }

    assert_eq!(progress.job_id, job_id);
    assert_eq!(progress.status, JobVerdict::Failed);

    // Three provider attempts, then the job goes terminal.
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.queue.job(job_id).unwrap().state, JobState::Failed);

    // The target keeps its last-known status and no alert is sent.
    let target = h
        .store
        .get_target("G-TTT", Marketplace::De)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(target.status, TargetStatus::Normal);
    assert_eq!(h.store.status_updates.load(Ordering::SeqCst), 0);
    assert_eq!(h.sender.sent.load(Ordering::SeqCst), 0);

    let rows = h.store.history_rows();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_broken);
    assert!(!rows[0].notified);
    assert!(rows[0].detail["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_checks_for_one_target_share_a_single_lookup() {
    let store = MemoryStore::with_channel();
    store.insert(normal_target("G-DUP", Marketplace::Jp));
    let provider = FakeProvider::new([("G-DUP", Scripted::Normal)]);
    let h = harness(store, provider);
    let mut rx = h.broadcaster.subscribe();

    let (first_id, first_fresh) = h.queue.enqueue(
        TargetRef::group("G-DUP"),
        Marketplace::Jp,
        EnqueueOptions::default(),
    );
    let (second_id, second_fresh) = h.queue.enqueue(
        TargetRef::group("G-DUP"),
        Marketplace::Jp,
        EnqueueOptions::default(),
    );
    assert!(first_fresh);
    assert!(!second_fresh);
    assert_eq!(first_id, second_id);

    let handles = h.pool.start();
    let progress = loop {
        if let WsMessage::CheckProgress(progress) = rx.recv().await.unwrap() {
            break progress;
        }
    };
    for handle in handles {
        handle.abort();
    }

    assert_eq!(progress.status, JobVerdict::Normal);
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.queue.job(first_id).unwrap().state, JobState::Completed);
    assert_eq!(h.store.history_rows().len(), 1);
}
