//! Collapses concurrent identical check requests into one execution.
//!
//! The key space is `"{identifier}:{marketplace}"` — deliberately coarser than
//! full request parameters, because checks have no parameterization beyond
//! target and marketplace.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tracing::{debug, warn};

struct InflightEntry<T> {
    ticket: u64,
    created_at: Instant,
    tx: broadcast::Sender<T>,
}

/// At most one in-flight execution per key; joiners receive the identical
/// result the executing call produces. Entries older than the TTL are evicted
/// on the next request for that key, bounding memory under pathological hangs.
pub struct RequestDeduplicator<T: Clone> {
    inflight: DashMap<String, InflightEntry<T>>,
    ttl: Duration,
    next_ticket: AtomicU64,
}

impl<T: Clone + Send + 'static> RequestDeduplicator<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inflight: DashMap::new(),
            ttl,
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Either becomes the executor for `key` (running `fut`) or joins the
    /// in-flight execution and awaits its result.
    pub async fn dedupe<F>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // Register as the executor for this key, or join the in-flight call.
        let ticket = loop {
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            let mut rx = match self.inflight.entry(key.to_string()) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().created_at.elapsed() >= self.ttl {
                        // Leaked or hung execution: evict and take over.
                        warn!(key, "Evicting expired in-flight entry.");
                        let (tx, _) = broadcast::channel(1);
                        occupied.insert(InflightEntry {
                            ticket,
                            created_at: Instant::now(),
                            tx,
                        });
                        break ticket;
                    }
                    debug!(key, "Joining in-flight check.");
                    occupied.get().tx.subscribe()
                }
                Entry::Vacant(vacant) => {
                    let (tx, _) = broadcast::channel(1);
                    vacant.insert(InflightEntry {
                        ticket,
                        created_at: Instant::now(),
                        tx,
                    });
                    break ticket;
                }
            };

            match rx.recv().await {
                Ok(value) => return value,
                // The executor was evicted before publishing a result; race
                // for the key again.
                Err(_) => continue,
            }
        };

        let value = fut.await;
        // Only remove the entry if it is still ours: an eviction may have
        // replaced it while we were executing.
        let tx = self
            .inflight
            .remove_if(key, |_, entry| entry.ticket == ticket)
            .map(|(_, entry)| entry.tx);
        if let Some(tx) = tx {
            // No receivers just means nobody joined; that's fine.
            let _ = tx.send(value.clone());
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn concurrent_callers_share_one_invocation() {
        let dedupe = Arc::new(RequestDeduplicator::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedupe = dedupe.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                dedupe
                    .dedupe("B000TEST01:US", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "broken"
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "broken");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedupe.inflight_count(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let dedupe = Arc::new(RequestDeduplicator::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for key in ["A:US", "A:UK", "B:US"] {
            let dedupe = dedupe.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                dedupe
                    .dedupe(key, async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        key
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_evicted_and_reexecuted() {
        let dedupe = Arc::new(RequestDeduplicator::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicU32::new(0));

        // First execution hangs well past the TTL.
        let hung = {
            let dedupe = dedupe.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                dedupe
                    .dedupe("G-1:US", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1u32
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(dedupe.inflight_count(), 1);

        // Past the TTL a new caller must not be stuck behind the hung entry.
        let calls_in = calls.clone();
        let fresh = dedupe
            .dedupe("G-1:US", async move {
                calls_in.fetch_add(1, Ordering::SeqCst);
                2u32
            })
            .await;
        assert_eq!(fresh, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The hung executor still gets its own result back.
        assert_eq!(hung.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sequential_calls_each_execute() {
        let dedupe = RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            dedupe
                .dedupe("B00X:DE", async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
