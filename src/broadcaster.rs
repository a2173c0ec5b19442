//! Fans progress and completion events out to connected dashboard sessions.
//!
//! Delivery is best effort: events are not persisted or redelivered, and a
//! session that cannot keep up or has gone away is simply dropped by its own
//! websocket task. A client reconnecting mid-run picks the stream up from
//! that point and can fetch the latest batch summary over HTTP.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::web::models::ws_models::{Heartbeat, WsMessage};

#[derive(Clone, Debug)]
pub struct ProgressBroadcaster {
    tx: broadcast::Sender<WsMessage>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Sends an event to every connected session. A send error only means
    /// there are no subscribers, which is not a fault.
    pub fn broadcast(&self, message: WsMessage) {
        if let Err(e) = self.tx.send(message) {
            debug!("No live feed subscribers for event: {e}");
        }
    }

    /// Spawns the periodic liveness heartbeat for connected sessions.
    pub fn spawn_heartbeat(&self, interval: Duration) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Heartbeat task started.");
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                broadcaster.broadcast(WsMessage::Heartbeat(Heartbeat {
                    timestamp: Utc::now(),
                }));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let broadcaster = ProgressBroadcaster::new(16);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        broadcaster.broadcast(WsMessage::Heartbeat(Heartbeat {
            timestamp: Utc::now(),
        }));
        assert!(matches!(a.recv().await.unwrap(), WsMessage::Heartbeat(_)));
        assert!(matches!(b.recv().await.unwrap(), WsMessage::Heartbeat(_)));
    }

    #[tokio::test]
    async fn dropped_sessions_do_not_affect_the_rest() {
        let broadcaster = ProgressBroadcaster::new(16);
        let gone = broadcaster.subscribe();
        let mut alive = broadcaster.subscribe();
        drop(gone);
        broadcaster.broadcast(WsMessage::Heartbeat(Heartbeat {
            timestamp: Utc::now(),
        }));
        assert!(matches!(alive.recv().await.unwrap(), WsMessage::Heartbeat(_)));
        assert_eq!(broadcaster.session_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_not_a_fault() {
        let broadcaster = ProgressBroadcaster::new(16);
        broadcaster.broadcast(WsMessage::Heartbeat(Heartbeat {
            timestamp: Utc::now(),
        }));
        assert_eq!(broadcaster.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_on_the_configured_interval() {
        let broadcaster = ProgressBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let handle = broadcaster.spawn_heartbeat(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(95)).await;
        let mut beats = 0;
        while let Ok(msg) = rx.try_recv() {
            assert!(matches!(msg, WsMessage::Heartbeat(_)));
            beats += 1;
        }
        assert_eq!(beats, 3);
        handle.abort();
    }
}
