//! Tails the server's progress feed and prints each event as one JSON line.
//! Handy for watching a sweep from a terminal or piping into jq.

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use varwatch::feed_client::{FeedClient, FeedClientConfig};
use varwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the monitor feed
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws/monitor")]
    url: String,

    /// Consecutive connection failures tolerated before pausing; send SIGHUP
    /// to retry after that
    #[arg(long, default_value_t = 10)]
    max_reconnects: u32,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = VERSION, url = %args.url, "feedtail starting");

    let mut config = FeedClientConfig::new(args.url);
    config.max_reconnect_attempts = args.max_reconnects;

    let (tx, mut rx) = mpsc::channel(64);
    let mut client = FeedClient::new(config);

    #[cfg(unix)]
    {
        let retry = client.retry_handle();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let Ok(mut hup) = signal(SignalKind::hangup()) else {
                return;
            };
            while hup.recv().await.is_some() {
                info!("SIGHUP received, retrying feed connection");
                retry.notify_one();
            }
        });
    }

    let runner = tokio::spawn(async move { client.run(tx).await });

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("unserializable event: {e}"),
        }
    }
    let _ = runner.await;
}
