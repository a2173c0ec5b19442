use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use sea_orm::{ConnectOptions, Database};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use varwatch::broadcaster::ProgressBroadcaster;
use varwatch::config::{MonitorConfig, ServerConfig};
use varwatch::db::DbStore;
use varwatch::marketplace::PeakSchedule;
use varwatch::monitor::queue::QueueConfig;
use varwatch::monitor::retry::{RetryExecutor, RetryPolicy};
use varwatch::monitor::{
    BatchTracker, MonitorWorkerPool, RequestDeduplicator, TaskQueue, sweep,
};
use varwatch::notifications::NotificationGateway;
use varwatch::notifications::senders::webhook::WebhookSender;
use varwatch::provider::AmazonCatalogClient;
use varwatch::store::MonitorStore;
use varwatch::version::VERSION;
use varwatch::web::{AppState, create_router};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a peak-window schedule TOML file (overrides the built-in table)
    #[arg(short, long)]
    peak_schedule: Option<String>,

    /// Listen address, e.g. 0.0.0.0:8080 (overrides VARWATCH_LISTEN_ADDR)
    #[arg(short, long)]
    listen: Option<String>,
}

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("varwatch server version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    init_logging();
    info!("Starting varwatch server, version: {}", VERSION);
    dotenv().ok();

    let mut server_config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load server configuration: {}", e);
            return Err(e.into());
        }
    };
    if let Some(listen) = args.listen {
        server_config.listen_addr = listen;
    }
    let monitor_config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load monitor configuration: {}", e);
            return Err(e.into());
        }
    };

    let schedule_path = args
        .peak_schedule
        .or_else(|| server_config.peak_schedule_path.clone());
    let peak = match schedule_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let schedule = PeakSchedule::from_toml_str(&raw).map_err(|e| {
                error!(path, error = %e, "Invalid peak schedule file.");
                e
            })?;
            info!(path, "Loaded peak schedule from file.");
            Arc::new(schedule)
        }
        None => Arc::new(PeakSchedule::default()),
    };

    let mut opt = ConnectOptions::new(server_config.database_url.clone());
    opt.max_connections(10);
    let db = Database::connect(opt).await?;
    info!("Database connection established.");
    let store: Arc<dyn MonitorStore> = Arc::new(DbStore::new(db));

    let provider = Arc::new(AmazonCatalogClient::new(
        &server_config.provider_endpoint,
        monitor_config.request_timeout,
    )?);

    let queue = Arc::new(TaskQueue::new(QueueConfig {
        concurrency_cap: monitor_config.concurrency,
        job_max_attempts: monitor_config.job_max_attempts,
        completed_retention: monitor_config.completed_retention,
        failed_retention: monitor_config.failed_retention,
    }));
    let batches = Arc::new(BatchTracker::new(monitor_config.batch_summary_retention));
    let dedupe = Arc::new(RequestDeduplicator::new(monitor_config.dedupe_ttl));
    let retry = RetryExecutor::new(RetryPolicy {
        max_attempts: monitor_config.provider_max_attempts,
        base_delay: monitor_config.retry_base_delay,
        ..RetryPolicy::default()
    });
    let broadcaster = ProgressBroadcaster::new(256);
    let gateway = Arc::new(NotificationGateway::new(
        Arc::clone(&store),
        Arc::new(WebhookSender::new()),
    ));

    let pool = Arc::new(MonitorWorkerPool::new(
        Arc::clone(&queue),
        Arc::clone(&batches),
        dedupe,
        retry,
        provider,
        Arc::clone(&store),
        gateway,
        broadcaster.clone(),
        monitor_config.concurrency,
    ));
    let worker_handles = pool.start();
    info!(workers = worker_handles.len(), "Worker pool started.");

    tokio::spawn(sweep::sweep_loop(
        Arc::clone(&queue),
        Arc::clone(&store),
        Arc::clone(&batches),
        broadcaster.clone(),
        monitor_config.sweep_interval,
    ));
    let heartbeat_handle = broadcaster.spawn_heartbeat(monitor_config.heartbeat_interval);

    let state = Arc::new(AppState {
        queue,
        batches,
        store,
        broadcaster,
        peak,
        config: monitor_config,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&server_config.listen_addr).await?;
    info!(addr = %server_config.listen_addr, "HTTP server listening.");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await?;

    heartbeat_handle.abort();
    for handle in worker_handles {
        handle.abort();
    }
    info!("Server stopped.");
    Ok(())
}
