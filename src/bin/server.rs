//! Hourcast Server - Headless prediction scheduler
//!
//! Generates a prediction for every configured instrument once per hour at
//! the 5/7 mark and verifies finished hours at the top of the next hour.
//! Metrics are pushed via structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! MODE=binance SYMBOLS=BTC/USDT,ETH/USDT cargo run --bin server
//! ```
//!
//! # Environment Variables
//! - `OBSERVABILITY_ENABLED` - Enable metrics reporting (default: true)
//! - `OBSERVABILITY_INTERVAL` - Interval in seconds between metric outputs (default: 60)

use anyhow::Result;
use hourcast::application::system::Application;
use hourcast::config::Config;
use hourcast::infrastructure::observability::MetricsReporter;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Hourcast Server {} starting...", env!("CARGO_PKG_VERSION"));

    // Configuration errors are the only fatal ones
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Mode={:?}, Symbols={:?}, Timeframe={}",
        config.mode, config.prediction.symbols, config.prediction.bar_timeframe
    );

    let observability = config.observability.clone();
    let app = Application::build(config).await?;
    let handle = app.start().await?;
    info!("Scheduler running.");

    if observability.enabled {
        let reporter = MetricsReporter::new(
            handle.repository.clone(),
            handle.clock.clone(),
            handle.metrics.clone(),
            observability.interval_seconds,
        );
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!(
            "Metrics reporter started (interval: {}s)",
            observability.interval_seconds
        );
    } else {
        info!("Metrics reporting disabled.");
    }

    info!("Server running. Press Ctrl+C to shutdown.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");
    handle.scheduler.shutdown();

    Ok(())
}
