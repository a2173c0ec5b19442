//! Client side of the `/ws/monitor` progress feed, with automatic
//! reconnection. Used by the `feedtail` binary and by operator tooling that
//! wants a resilient event stream without re-implementing backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use crate::web::models::ws_models::WsMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug)]
pub struct FeedClientConfig {
    pub url: String,
    /// First reconnect delay; doubles per consecutive failure.
    pub base_delay: Duration,
    /// Consecutive failures tolerated before pausing for a manual retry.
    pub max_reconnect_attempts: u32,
    pub ping_interval: Duration,
}

impl FeedClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_delay: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            ping_interval: Duration::from_secs(30),
        }
    }
}

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5 * 60);

/// Delay before reconnect attempt `attempt` (1-based): doubles per failure,
/// capped at five minutes.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RECONNECT_DELAY)
}

pub struct FeedClient {
    config: FeedClientConfig,
    state: ConnectionState,
    retry: Arc<Notify>,
}

impl FeedClient {
    pub fn new(config: FeedClientConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            retry: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handle for restarting reconnection once the automatic budget is spent
    /// (wired to a "reconnect" button or operator signal).
    pub fn retry_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.retry)
    }

    /// Connects and forwards every decoded feed event into `events`. Retries
    /// with doubling delays; a successful connection resets the failure
    /// count. Once the attempt budget is spent, reconnection pauses until the
    /// [`retry_handle`](Self::retry_handle) fires. Returns only when the
    /// receiver side of `events` is dropped.
    pub async fn run(&mut self, events: mpsc::Sender<WsMessage>) {
        let mut failures = 0u32;
        loop {
            self.state = ConnectionState::Connecting;
            info!(url = %self.config.url, "Connecting to monitor feed.");
            match connect_async(&self.config.url).await {
                Ok((ws, _)) => {
                    self.state = ConnectionState::Connected;
                    failures = 0;
                    info!(url = %self.config.url, "Monitor feed connected.");
                    if !self.pump(ws, &events).await {
                        // Consumer went away, nothing left to do.
                        self.state = ConnectionState::Disconnected;
                        return;
                    }
                    warn!("Monitor feed connection lost.");
                }
                Err(e) => {
                    warn!(error = %e, "Monitor feed connection failed.");
                }
            }
            self.state = ConnectionState::Disconnected;

            failures += 1;
            if failures >= self.config.max_reconnect_attempts {
                error!(
                    attempts = failures,
                    "Reconnect budget exhausted, waiting for a manual retry."
                );
                self.retry.notified().await;
                failures = 0;
                continue;
            }
            let delay = reconnect_delay(self.config.base_delay, failures);
            info!(attempt = failures, delay_secs = delay.as_secs(), "Reconnecting after delay.");
            tokio::time::sleep(delay).await;
        }
    }

    /// Reads one connection until it drops. Returns false when the event
    /// consumer disappeared and the client should stop entirely.
    async fn pump(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        events: &mpsc::Sender<WsMessage>,
    ) -> bool {
        let (mut write, mut read) = ws.split();
        let mut ping_timer = tokio::time::interval(self.config.ping_interval);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_timer.tick().await;

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if write.send(Message::Text("ping".into())).await.is_err() {
                        return true;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if text == "pong" {
                                continue;
                            }
                            match serde_json::from_str::<WsMessage>(&text) {
                                Ok(event) => {
                                    if events.send(event).await.is_err() {
                                        return false;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "Unparseable feed event, skipping.");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if write.send(Message::Pong(payload)).await.is_err() {
                                return true;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return true,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Monitor feed read error.");
                            return true;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_and_caps() {
        let base = Duration::from_secs(5);
        assert_eq!(reconnect_delay(base, 1), Duration::from_secs(5));
        assert_eq!(reconnect_delay(base, 2), Duration::from_secs(10));
        assert_eq!(reconnect_delay(base, 3), Duration::from_secs(20));
        assert_eq!(reconnect_delay(base, 7), Duration::from_secs(300));
        assert_eq!(reconnect_delay(base, 30), MAX_RECONNECT_DELAY);
    }
}
