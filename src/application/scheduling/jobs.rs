//! The two recurring job bodies.

use super::{Job, JobOutcome, job_fn};
use crate::application::prediction::{PredictionOrchestrator, VerificationEngine};
use crate::domain::errors::PredictionError;
use crate::domain::market::session::floor_to_hour;
use crate::domain::ports::Clock;
use anyhow::anyhow;
use std::sync::Arc;
use tracing::{info, warn};

/// Generates the current hour's prediction for every symbol, one after the
/// other. Non-retriable per-symbol failures are logged and skipped; the run
/// fails only when some symbol hit a transient I/O error, so a retry wrapper
/// can re-run it. Symbols already stored count as duplicates on re-runs.
pub fn generation_job(
    orchestrator: Arc<PredictionOrchestrator>,
    symbols: Vec<String>,
    clock: Arc<dyn Clock>,
) -> Job {
    let symbols = Arc::new(symbols);
    job_fn(move || {
        let orchestrator = orchestrator.clone();
        let symbols = symbols.clone();
        let clock = clock.clone();
        async move {
            let hour_start = floor_to_hour(clock.now());
            let (mut generated, mut duplicates, mut skipped) = (0usize, 0usize, 0usize);
            let mut transient = Vec::new();

            for symbol in symbols.iter() {
                match orchestrator.generate(symbol, hour_start).await {
                    Ok(_) => generated += 1,
                    Err(PredictionError::DuplicateRecord { .. }) => duplicates += 1,
                    Err(e) if e.is_retriable() => {
                        warn!("generation: {} {} transient failure: {}", symbol, hour_start, e);
                        transient.push(symbol.clone());
                    }
                    Err(e) => {
                        info!("generation: no prediction for {} {}: {}", symbol, hour_start, e);
                        skipped += 1;
                    }
                }
            }

            if !transient.is_empty() {
                return Err(anyhow!(
                    "transient failures for {} at {}",
                    transient.join(", "),
                    hour_start
                ));
            }
            Ok(JobOutcome::Completed(format!(
                "hour {}: generated={} duplicate={} skipped={}",
                hour_start, generated, duplicates, skipped
            )))
        }
    })
}

/// Verifies up to `limit` pending predictions whose hour has finished.
pub fn verification_job(engine: Arc<VerificationEngine>, limit: usize) -> Job {
    job_fn(move || {
        let engine = engine.clone();
        async move {
            let summary = engine.verify_pending(limit).await?;
            Ok(JobOutcome::Completed(format!(
                "verified={} correct={} incorrect={} not_ready={} failed={}",
                summary.verified,
                summary.correct,
                summary.incorrect,
                summary.not_ready,
                summary.failed
            )))
        }
    })
}
