use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sydradb_core::{EngineConfig, FsyncPolicy};

mod metrics_bridge;

/// Reads a couple of environment knobs with sane defaults. This binary
/// does no config *file* parsing — that's an external collaborator's job,
/// per the core's own scope.
fn config_from_env() -> EngineConfig {
    let data_dir = std::env::var("SYDRA_DATA_DIR").unwrap_or_else(|_| "./sydra-data".to_string());
    EngineConfig::new(data_dir)
        .with_fsync(FsyncPolicy::Interval)
        .with_flush_interval_ms(
            std::env::var("SYDRA_FLUSH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(sydradb_core::config::DEFAULT_FLUSH_INTERVAL_MS),
        )
        .with_retention_days(
            std::env::var("SYDRA_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        )
}

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(true)
        .pretty()
        .init();

    let metrics_addr: SocketAddr = std::env::var("SYDRA_METRICS_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 9090)));
    if let Err(e) = metrics_bridge::init(metrics_addr) {
        eprintln!("Failed to initialize metrics: {}", e);
    } else {
        info!("Metrics server listening on {}", metrics_addr);
    }

    info!("Starting SydraDB storage/ingest core...");
    let config = config_from_env();
    let engine = match sydradb_core::Engine::open(config).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    // Bridge the engine's in-process counters onto Prometheus on a fixed
    // cadence; the core itself never depends on the metrics crates.
    let reporting_engine = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            metrics_bridge::report(&reporting_engine.metrics());
        }
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    info!("Shutting down...");
    if let Err(e) = engine.shutdown().await {
        eprintln!("Error during shutdown: {}", e);
    }
}
