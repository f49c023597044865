//! Bingo server binary
//!
//! Loads configuration, recovers persisted games, runs the draw scheduler and
//! serves the HTTP/WebSocket API until Ctrl+C or SIGTERM.

use bingo_engine::api::{shutdown_signal, ApiServer};
use bingo_engine::cache::StateCache;
use bingo_engine::common::config::{generate_sample_config, ConfigLoader};
use bingo_engine::config::StorageBackend;
use bingo_engine::logging::init_tracing;
use bingo_engine::scheduler::{DrawScheduler, IntervalTicker};
use bingo_engine::{BingoResult, ServiceBuilder};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bingo-server")]
#[command(about = "Stake-based bingo game server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, short)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Keep all state in memory (nothing survives a restart)
    #[arg(long)]
    memory_store: bool,

    /// Milliseconds between scheduled draws
    #[arg(long)]
    draw_interval_ms: Option<u64>,

    /// Only draw on explicit API requests
    #[arg(long)]
    no_scheduler: bool,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    write_sample_config: Option<String>,
}

#[tokio::main]
async fn main() -> BingoResult<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    if let Some(path) = args.write_sample_config.as_deref() {
        generate_sample_config(path)?;
        println!("Sample configuration written to {}", path);
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config.as_deref() {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.data_directory = db_path;
    }
    if args.memory_store {
        config.storage.backend = StorageBackend::Memory;
    }
    if let Some(interval) = args.draw_interval_ms {
        config.scheduler.draw_interval_ms = interval;
    }
    if args.no_scheduler {
        config.scheduler.enabled = false;
    }
    config.validate()?;

    init_tracing(&config.monitoring);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.monitoring.environment,
        backend = ?config.storage.backend,
        "Starting bingo server"
    );

    let api_config = config.api.clone();
    let scheduler_enabled = config.scheduler.enabled;
    let draw_interval = config.draw_interval();

    let service = Arc::new(ServiceBuilder::new().with_config(config).build()?);

    let report = service.recover()?;
    info!(
        restored = report.restored.len(),
        refunded = report.refunded.len(),
        resettled = report.resettled.len(),
        corrupt = report.corrupt.len(),
        "Recovery finished"
    );

    let cleanup = StateCache::start_cleanup_task(service.cache());

    let scheduler = Arc::new(DrawScheduler::new(service.directory()));
    let scheduler_task = if scheduler_enabled {
        info!(interval_ms = draw_interval.as_millis() as u64, "Draw scheduler enabled");
        Some(Arc::clone(&scheduler).spawn(Box::new(IntervalTicker::new(draw_interval))))
    } else {
        info!("Draw scheduler disabled, draws happen on request only");
        None
    };

    let server = ApiServer::new(api_config, Arc::clone(&service));
    let served = server.run(shutdown_signal()).await;

    scheduler.stop();
    if let Some(task) = scheduler_task {
        task.abort();
        let _ = task.await;
    }
    cleanup.abort();

    match service.drain() {
        Ok(written) => info!(games = written, "Live games persisted"),
        Err(e) => warn!(error = %e, "Failed to persist every live game on shutdown"),
    }

    served
}
