//! Push-based metrics reporter for Hourcast
//!
//! Periodically outputs accuracy metrics as structured JSON to stdout.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::domain::performance::AccuracyStats;
use crate::domain::ports::Clock;
use crate::domain::repositories::PredictionRepository;
use crate::infrastructure::observability::metrics::Metrics;
use chrono::Duration as ChronoDuration;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Upper bound on the pending count the reporter scans.
const PENDING_SCAN_LIMIT: usize = 10_000;

/// Metrics snapshot for JSON output
#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub window_days: i64,
    pub pending_verifications: usize,
    pub accuracy: AccuracyStats,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    repository: Arc<dyn PredictionRepository>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
    window_days: i64,
}

impl MetricsReporter {
    /// Create a new metrics reporter
    ///
    /// # Arguments
    /// * `repository` - Prediction store the accuracy is computed from
    /// * `metrics` - Prometheus metrics (for internal tracking)
    /// * `interval_seconds` - How often to output metrics (default: 60)
    pub fn new(
        repository: Arc<dyn PredictionRepository>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        interval_seconds: u64,
    ) -> Self {
        Self {
            repository,
            clock,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
            window_days: 30,
        }
    }

    /// Run the reporter in a loop, outputting metrics periodically
    pub async fn run(self) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;

            match self.collect_snapshot().await {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        // Prefix so logs can be filtered
                        println!("METRICS_JSON:{}", json);
                        info!(
                            "Accuracy: {} | Verified: {} | Pending: {} | Uptime: {}s",
                            snapshot
                                .accuracy
                                .accuracy_pct()
                                .map(|a| format!("{:.1}%", a))
                                .unwrap_or_else(|| "n/a".to_string()),
                            snapshot.accuracy.overall.total,
                            snapshot.pending_verifications,
                            snapshot.uptime_seconds
                        );
                    }
                    Err(e) => warn!("Failed to serialize metrics: {}", e),
                },
                Err(e) => warn!("Failed to collect metrics: {}", e),
            }
        }
    }

    /// Collect current metrics snapshot
    async fn collect_snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        let now = self.clock.now();
        let uptime = self.start_time.elapsed().as_secs();
        let since = now - ChronoDuration::days(self.window_days);

        let verified = self.repository.find_verified(None, since).await?;
        let accuracy = AccuracyStats::from_predictions(&verified);
        let pending = self
            .repository
            .get_pending_verifications(now, PENDING_SCAN_LIMIT)
            .await?
            .len();

        if let Some(pct) = accuracy.accuracy_pct() {
            self.metrics.accuracy_current.set(pct / 100.0);
        }
        self.metrics.pending_verifications.set(pending as f64);
        self.metrics.uptime_seconds.set(uptime as f64);

        Ok(MetricsSnapshot {
            timestamp: now.to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            window_days: self.window_days,
            pending_verifications: pending,
            accuracy,
        })
    }
}
