use crate::application::prediction::orchestrator::PredictionContext;
use crate::domain::errors::PredictionError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::performance::AccuracyStats;
use crate::domain::prediction::engine::{classify_strength, direction_from_deviation};
use crate::domain::prediction::segmenter::prediction_point;
use crate::domain::prediction::types::{
    Direction, HOUR_MS, Prediction, Strength, VerificationResult,
};
use crate::domain::validation::StrictBarValidator;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// Outcome of verifying a single prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Verified {
        result: VerificationResult,
        realized_direction: Direction,
        realized_strength: Strength,
        realized_close: f64,
        realized_deviation: f64,
    },
    /// The verdict was already written; nothing changed.
    AlreadyVerified,
    /// The hour (plus buffer) has not elapsed.
    NotReady { ready_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationSummary {
    pub verified: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub not_ready: usize,
    pub failed: usize,
}

/// Scores stored predictions against the hour's final close.
pub struct VerificationEngine {
    ctx: PredictionContext,
    timeframe: Timeframe,
    buffer: Duration,
}

impl VerificationEngine {
    pub fn new(ctx: PredictionContext, timeframe: Timeframe, buffer: Duration) -> Self {
        Self {
            ctx,
            timeframe,
            buffer,
        }
    }

    /// Verifies one prediction. Idempotent: a verified prediction is never
    /// re-scored.
    pub async fn verify(
        &self,
        prediction: &Prediction,
    ) -> Result<VerificationOutcome, PredictionError> {
        if !prediction.is_pending() {
            return Ok(VerificationOutcome::AlreadyVerified);
        }
        let id = prediction.id.ok_or_else(|| {
            PredictionError::invalid_input("cannot verify a prediction that was never stored")
        })?;

        let hour_end = prediction.hour_end();
        let ready_at = hour_end + self.buffer;
        let now = self.ctx.clock.now();
        if now < ready_at {
            return Ok(VerificationOutcome::NotReady { ready_at });
        }

        // Blocks 6-7 only
        let bars = self
            .ctx
            .bar_source
            .fetch_bars(
                &prediction.instrument_id,
                prediction_point(prediction.hour_start),
                hour_end,
                self.timeframe,
            )
            .await
            .map_err(PredictionError::TransientIo)?;
        let bars = StrictBarValidator::retain_valid(bars);

        let final_bar = bars
            .iter()
            .filter(|b| b.timestamp < hour_end.timestamp_millis())
            .max_by_key(|b| b.timestamp)
            .ok_or_else(|| {
                PredictionError::data_unavailable(
                    &prediction.instrument_id,
                    format!("no bars after 5/7 of hour {}", prediction.hour_start),
                )
            })?;

        let realized_close = final_bar.close_f64();
        let reference = prediction.reference;
        let realized_deviation = (realized_close - reference.hour_open) / reference.volatility;
        let realized_direction = direction_from_deviation(realized_deviation);
        let realized_strength = classify_strength(realized_deviation);

        let result = if realized_direction == prediction.direction {
            VerificationResult::Correct
        } else {
            VerificationResult::Wrong
        };

        let updated = self
            .ctx
            .repository
            .update_verification(id, result, realized_close, now)
            .await
            .map_err(PredictionError::TransientIo)?;
        if !updated {
            debug!(
                "VerificationEngine: prediction {} was verified concurrently",
                id
            );
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        info!(
            "VerificationEngine: {} {} predicted {} realized {} ({:+.2}) -> {}",
            prediction.instrument_id,
            prediction.hour_start,
            prediction.direction,
            realized_direction,
            realized_deviation,
            result
        );

        Ok(VerificationOutcome::Verified {
            result,
            realized_direction,
            realized_strength,
            realized_close,
            realized_deviation,
        })
    }

    /// Verifies up to `limit` pending predictions whose hour and buffer have
    /// elapsed. A failed attempt is recorded against the prediction so it
    /// sorts behind fresh ones on the next batch. Individual
    /// failures are counted, never propagated; only loading the batch can fail.
    pub async fn verify_pending(
        &self,
        limit: usize,
    ) -> Result<VerificationSummary, PredictionError> {
        let started_by = self.ctx.clock.now() - Duration::milliseconds(HOUR_MS) - self.buffer;
        let pending = self
            .ctx
            .repository
            .get_pending_verifications(started_by, limit)
            .await
            .map_err(PredictionError::TransientIo)?;

        let mut summary = VerificationSummary::default();
        for prediction in &pending {
            let label = match self.verify(prediction).await {
                Ok(VerificationOutcome::Verified { result, .. }) => {
                    summary.verified += 1;
                    if result == VerificationResult::Correct {
                        summary.correct += 1;
                        "correct"
                    } else {
                        summary.incorrect += 1;
                        "wrong"
                    }
                }
                Ok(VerificationOutcome::NotReady { .. }) => {
                    summary.not_ready += 1;
                    "not_ready"
                }
                Ok(VerificationOutcome::AlreadyVerified) => "already_verified",
                Err(e) => {
                    warn!(
                        "VerificationEngine: {} {} failed: {}",
                        prediction.instrument_id, prediction.hour_start, e
                    );
                    summary.failed += 1;
                    if let Some(id) = prediction.id
                        && let Err(e) = self.ctx.repository.record_verification_failure(id).await
                    {
                        warn!(
                            "VerificationEngine: could not record failed attempt for {}: {}",
                            id, e
                        );
                    }
                    "failed"
                }
            };
            if let Some(metrics) = &self.ctx.metrics {
                metrics.inc_verification(label);
            }
        }

        info!(
            "VerificationEngine: batch of {} -> verified={} correct={} incorrect={} not_ready={} failed={}",
            pending.len(),
            summary.verified,
            summary.correct,
            summary.incorrect,
            summary.not_ready,
            summary.failed
        );
        Ok(summary)
    }

    /// Accuracy of verified predictions with `hour_start >= since`. The
    /// optional symbol goes through the best-effort resolver, so `btcusdt`
    /// and `BTC/USDT` select the same records.
    pub async fn accuracy(
        &self,
        symbol: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<AccuracyStats, PredictionError> {
        let instrument_id = match symbol {
            Some(symbol) => Some(self.ctx.identity.resolve(symbol).await),
            None => None,
        };
        let verified = self
            .ctx
            .repository
            .find_verified(instrument_id.as_deref(), since)
            .await
            .map_err(PredictionError::TransientIo)?;
        Ok(AccuracyStats::from_predictions(&verified))
    }
}
