//! Prometheus metrics definitions for Hourcast
//!
//! All metrics use the `hourcast_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the prediction service
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Generation outcomes (generated, duplicate, no_data, skipped_future, failed)
    pub predictions_total: CounterVec,
    /// Verification outcomes (correct, wrong, not_ready, failed)
    pub verifications_total: CounterVec,
    /// Scheduler job runs by job and status
    pub job_runs_total: CounterVec,
    /// Job wall-clock duration in seconds
    pub job_duration_seconds: HistogramVec,
    /// Confidence of generated predictions by direction
    pub prediction_confidence: HistogramVec,
    /// Rolling accuracy of verified predictions (0-1)
    pub accuracy_current: GenericGauge<AtomicF64>,
    /// Predictions awaiting verification
    pub pending_verifications: GenericGauge<AtomicF64>,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let predictions_total = CounterVec::new(
            Opts::new("hourcast_predictions_total", "Prediction generation outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(predictions_total.clone()))?;

        let verifications_total = CounterVec::new(
            Opts::new("hourcast_verifications_total", "Prediction verification outcomes"),
            &["result"],
        )?;
        registry.register(Box::new(verifications_total.clone()))?;

        let job_runs_total = CounterVec::new(
            Opts::new("hourcast_job_runs_total", "Scheduler job runs by status"),
            &["job", "status"],
        )?;
        registry.register(Box::new(job_runs_total.clone()))?;

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new("hourcast_job_duration_seconds", "Job duration in seconds")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0, 60.0, 120.0]),
            &["job"],
        )?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        let prediction_confidence = HistogramVec::new(
            HistogramOpts::new(
                "hourcast_prediction_confidence",
                "Confidence of generated predictions",
            )
            .buckets(vec![20.0, 35.0, 50.0, 65.0, 75.0, 85.0, 95.0]),
            &["direction"],
        )?;
        registry.register(Box::new(prediction_confidence.clone()))?;

        let accuracy_current = Gauge::with_opts(Opts::new(
            "hourcast_accuracy_current",
            "Accuracy of verified predictions (0-1)",
        ))?;
        registry.register(Box::new(accuracy_current.clone()))?;

        let pending_verifications = Gauge::with_opts(Opts::new(
            "hourcast_pending_verifications",
            "Predictions awaiting verification",
        ))?;
        registry.register(Box::new(pending_verifications.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "hourcast_uptime_seconds",
            "Server uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            predictions_total,
            verifications_total,
            job_runs_total,
            job_duration_seconds,
            prediction_confidence,
            accuracy_current,
            pending_verifications,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_prediction(&self, outcome: &str) {
        self.predictions_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_confidence(&self, direction: &str, confidence: f64) {
        self.prediction_confidence
            .with_label_values(&[direction])
            .observe(confidence);
    }

    pub fn inc_verification(&self, result: &str) {
        self.verifications_total.with_label_values(&[result]).inc();
    }

    pub fn inc_job_run(&self, job: &str, status: &str) {
        self.job_runs_total.with_label_values(&[job, status]).inc();
    }

    pub fn observe_job_duration(&self, job: &str, seconds: f64) {
        self.job_duration_seconds
            .with_label_values(&[job])
            .observe(seconds);
    }
}
