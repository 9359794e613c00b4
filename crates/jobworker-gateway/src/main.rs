use clap::Parser;
use jobworker_core::config::WorkerConfig;
use jobworker_driver::{Driver, DriverEvent};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

mod app;
mod http;
mod notify;
mod source;

/// Events buffered between the driver and the notifier before new ones are
/// dropped.
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Parser)]
#[command(
    name = "jobworker",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("JOBWORKER_GIT_SHA"), ")"),
    about = "Runs scheduled jobs as local processes"
)]
struct Cli {
    /// Config file (default: ~/.jobworker/jobworker.toml)
    #[arg(long, env = "JOBWORKER_CONFIG")]
    config: Option<String>,

    /// JSON file of job definitions, overriding [jobs].file
    #[arg(long)]
    jobs: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jobworker=info,jobworker_driver=info,jobworker_exec=info,\
                 jobworker_scheduler=warn,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let mut config = WorkerConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        WorkerConfig::default()
    });
    if let Some(jobs) = cli.jobs {
        config.jobs.file = Some(jobs);
    }

    std::fs::create_dir_all(&config.driver.root)?;
    info!(root = %config.driver.root, "job root ready");

    let (event_tx, event_rx) = mpsc::channel::<DriverEvent>(EVENT_BUFFER);
    let notifier = tokio::spawn(notify::run(event_rx, config.notify.max_output_chars));
    let driver = Driver::new(&config.driver.root, Arc::new(event_tx));

    if let Some(ref file) = config.jobs.file {
        for def in source::load(Path::new(file), driver.root())? {
            driver.set(def).await;
        }
    }

    // dispatch loop in background; stops and clears on shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick = Duration::from_millis(config.driver.tick_interval_ms);
    let dispatcher = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.run(tick, shutdown_rx).await })
    };

    if config.api.enabled {
        let addr: SocketAddr = format!("{}:{}", config.api.bind, config.api.port).parse()?;
        let state = Arc::new(app::AppState::new(config.clone(), driver.clone()));
        let router = app::build_router(state);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("jobworker API listening on {}", addr);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        info!("HTTP API disabled");
        shutdown_signal().await;
    }

    // signal the dispatch loop to stop
    let _ = shutdown_tx.send(true);
    dispatcher.await?;

    // last sender goes with the driver; the notifier drains and exits
    drop(driver);
    if tokio::time::timeout(Duration::from_secs(5), notifier)
        .await
        .is_err()
    {
        warn!("notifier did not drain in time");
    }
    info!("jobworker stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl+C ({e}), shutting down"),
    }
}
