//! Cosmic Watch - near-earth-object risk monitor.
//!
//! Polls the NEO feed on a fixed interval, opens discussion threads for risky
//! objects and alerts Telegram recipients about rising risk.

use anyhow::Result;
use cosmic_common::config::{config_path, Config};
use cosmic_common::logging::init_logging;
use cosmic_watch::WatchService;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    // Missing credentials abort startup
    let config = Config::load_and_validate()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Cosmic Watch v{}", env!("CARGO_PKG_VERSION"));

    let path = config_path();
    if path.exists() {
        tracing::info!(path = %path.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
    }

    let service = WatchService::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
