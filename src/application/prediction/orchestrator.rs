//! Prediction generation use cases.
//!
//! Wires the pure block engine to its collaborators: identity, bars,
//! volatility, market status, storage and clock. All collaborators are
//! injected; nothing here reads globals.

use crate::domain::errors::PredictionError;
use crate::domain::market::session::floor_to_hour;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{
    BarSource, Clock, IdentityResolver, MarketStatusProvider, VolatilityProvider,
};
use crate::domain::prediction::segmenter::{BlockSegmenter, prediction_point};
use crate::domain::prediction::types::{HOUR_MS, Prediction};
use crate::domain::prediction::PredictionEngine;
use crate::domain::repositories::{PredictionRepository, StoreOutcome};
use crate::domain::validation::StrictBarValidator;
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Slack before the exact 5/7 point. The 42:51 trigger fires 0.428 s early.
const PREDICTION_POINT_TOLERANCE_MS: i64 = 1_000;

/// Whether the clock has reached the hour's prediction point.
pub fn prediction_point_reached(hour_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now + Duration::milliseconds(PREDICTION_POINT_TOLERANCE_MS) >= prediction_point(hour_start)
}

/// Collaborators shared by generation and verification.
#[derive(Clone)]
pub struct PredictionContext {
    pub identity: Arc<dyn IdentityResolver>,
    pub bar_source: Arc<dyn BarSource>,
    pub volatility: Arc<dyn VolatilityProvider>,
    pub market_status: Arc<dyn MarketStatusProvider>,
    pub repository: Arc<dyn PredictionRepository>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<Metrics>,
}

/// What happened to one hour of a `generate_day` run.
#[derive(Debug, Clone, PartialEq)]
pub enum HourOutcome {
    Generated(Box<Prediction>),
    /// The hour has not reached its prediction point; nothing was fetched.
    SkippedFuture,
    SkippedNoData(String),
    Duplicate,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourReport {
    pub hour_start: DateTime<Utc>,
    pub outcome: HourOutcome,
}

/// Per-hour outcomes of a day's generation.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub symbol: String,
    pub date: NaiveDate,
    pub hours: Vec<HourReport>,
}

impl DaySummary {
    fn count(&self, pred: impl Fn(&HourOutcome) -> bool) -> usize {
        self.hours.iter().filter(|h| pred(&h.outcome)).count()
    }

    pub fn generated(&self) -> usize {
        self.count(|o| matches!(o, HourOutcome::Generated(_)))
    }

    pub fn skipped_future(&self) -> usize {
        self.count(|o| matches!(o, HourOutcome::SkippedFuture))
    }

    pub fn skipped_no_data(&self) -> usize {
        self.count(|o| matches!(o, HourOutcome::SkippedNoData(_)))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, HourOutcome::Duplicate))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, HourOutcome::Failed(_)))
    }
}

/// Result of a market-aware request.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketAwarePrediction {
    pub requested_hour: DateTime<Utc>,
    /// The hour the prediction is for. Differs from `requested_hour` when the
    /// market was closed and an earlier trading hour was substituted.
    pub resolved_hour: DateTime<Utc>,
    /// True when an already stored prediction was returned.
    pub reused: bool,
    pub prediction: Prediction,
}

impl MarketAwarePrediction {
    pub fn substituted(&self) -> bool {
        self.requested_hour != self.resolved_hour
    }
}

pub struct PredictionOrchestrator {
    ctx: PredictionContext,
    timeframe: Timeframe,
}

impl PredictionOrchestrator {
    pub fn new(ctx: PredictionContext, timeframe: Timeframe) -> Self {
        Self { ctx, timeframe }
    }

    /// Generates and stores the prediction for one instrument-hour.
    ///
    /// Refuses hours whose 5/7 point is still ahead of the clock. Nothing is
    /// stored unless every step succeeds.
    pub async fn generate(
        &self,
        symbol: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Prediction, PredictionError> {
        let result = self.generate_inner(symbol, hour_start).await;
        self.record_outcome(&result);
        result
    }

    async fn generate_inner(
        &self,
        symbol: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Prediction, PredictionError> {
        if floor_to_hour(hour_start) != hour_start {
            return Err(PredictionError::invalid_input(format!(
                "hour_start {} is not aligned to the hour",
                hour_start
            )));
        }

        let instrument_id = self
            .ctx
            .identity
            .resolve_strict(symbol)
            .await
            .map_err(PredictionError::TransientIo)?
            .ok_or_else(|| PredictionError::IdentityNotFound {
                symbol: symbol.to_string(),
            })?;

        let now = self.ctx.clock.now();
        if !prediction_point_reached(hour_start, now) {
            return Err(PredictionError::data_unavailable(
                &instrument_id,
                format!(
                    "prediction point {} of hour {} not reached at {}",
                    prediction_point(hour_start),
                    hour_start,
                    now
                ),
            ));
        }

        let hour_end = hour_start + Duration::milliseconds(HOUR_MS);
        let bars = self
            .ctx
            .bar_source
            .fetch_bars(&instrument_id, hour_start, hour_end, self.timeframe)
            .await
            .map_err(PredictionError::TransientIo)?;
        let bars = StrictBarValidator::retain_valid(bars);
        if bars.is_empty() {
            return Err(PredictionError::data_unavailable(
                &instrument_id,
                format!("no bars for hour {}", hour_start),
            ));
        }

        let volatility = self
            .ctx
            .volatility
            .volatility(&instrument_id, hour_start)
            .await
            .map_err(PredictionError::TransientIo)?
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| {
                PredictionError::data_unavailable(
                    &instrument_id,
                    format!("no volatility estimate before {}", hour_start),
                )
            })?;

        let segmented = BlockSegmenter::segment(&bars, hour_start, volatility)?;
        if !segmented.blocks.has_full_analysis_window() {
            let present: Vec<u8> = segmented.analysis_window().iter().map(|b| b.number).collect();
            return Err(PredictionError::data_unavailable(
                &instrument_id,
                format!(
                    "blocks 1-5 incomplete for hour {} (present: {:?})",
                    hour_start, present
                ),
            ));
        }

        let signal = PredictionEngine::predict(
            &segmented.analysis_window(),
            segmented.reference.hour_open,
            volatility,
        )?;

        let prediction = Prediction {
            id: None,
            symbol: symbol.to_string(),
            instrument_id: instrument_id.clone(),
            hour_start,
            prediction_timestamp: prediction_point(hour_start),
            direction: signal.direction,
            strength: signal.strength,
            confidence: signal.confidence,
            decision_tree: signal.decision_tree,
            early_bias: signal.early_bias.direction,
            early_bias_strength: signal.early_bias.strength,
            counter_direction: signal.counter.direction,
            deviation_at_5of7: signal.deviation_at_5of7,
            blocks: segmented.blocks,
            reference: segmented.reference,
            created_at: now,
            realized_close: None,
            actual_result: None,
            verified_at: None,
        };

        match self
            .ctx
            .repository
            .store(&prediction)
            .await
            .map_err(PredictionError::TransientIo)?
        {
            StoreOutcome::Stored(stored) => {
                info!(
                    "PredictionOrchestrator: {} {} -> {} ({}, {:.1}%) via {}",
                    instrument_id,
                    hour_start,
                    stored.direction,
                    stored.strength,
                    stored.confidence,
                    stored.decision_tree
                );
                Ok(stored)
            }
            StoreOutcome::Duplicate => Err(PredictionError::DuplicateRecord {
                instrument_id,
                hour_start,
            }),
        }
    }

    fn record_outcome(&self, result: &Result<Prediction, PredictionError>) {
        let Some(metrics) = &self.ctx.metrics else {
            return;
        };
        let label = match result {
            Ok(prediction) => {
                metrics.observe_confidence(&prediction.direction.to_string(), prediction.confidence);
                "generated"
            }
            Err(PredictionError::DuplicateRecord { .. }) => "duplicate",
            Err(PredictionError::DataUnavailable { .. }) => "no_data",
            Err(_) => "failed",
        };
        metrics.inc_prediction(label);
    }

    /// Generates every hour of `date` (UTC) whose prediction point has passed.
    /// Never fails; each hour's outcome is reported.
    pub async fn generate_day(&self, symbol: &str, date: NaiveDate) -> DaySummary {
        let now = self.ctx.clock.now();
        let day_start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let mut hours = Vec::with_capacity(24);

        for hour in 0..24 {
            let hour_start = day_start + Duration::hours(hour);
            let outcome = if !prediction_point_reached(hour_start, now) {
                if let Some(metrics) = &self.ctx.metrics {
                    metrics.inc_prediction("skipped_future");
                }
                HourOutcome::SkippedFuture
            } else {
                match self.generate(symbol, hour_start).await {
                    Ok(prediction) => HourOutcome::Generated(Box::new(prediction)),
                    Err(PredictionError::DataUnavailable { reason, .. }) => {
                        HourOutcome::SkippedNoData(reason)
                    }
                    Err(PredictionError::DuplicateRecord { .. }) => HourOutcome::Duplicate,
                    Err(e) => {
                        warn!(
                            "PredictionOrchestrator: {} hour {} failed: {}",
                            symbol, hour_start, e
                        );
                        HourOutcome::Failed(e.to_string())
                    }
                }
            };
            hours.push(HourReport {
                hour_start,
                outcome,
            });
        }

        let summary = DaySummary {
            symbol: symbol.to_string(),
            date,
            hours,
        };
        info!(
            "PredictionOrchestrator: {} {} generated={} duplicate={} no_data={} future={} failed={}",
            symbol,
            date,
            summary.generated(),
            summary.duplicates(),
            summary.skipped_no_data(),
            summary.skipped_future(),
            summary.failed()
        );
        summary
    }

    /// Like `generate`, but when the instrument's market is closed now it
    /// falls back to the same clock hour on the most recent trading day
    /// (up to a week back), reusing a stored prediction if there is one.
    pub async fn generate_market_aware(
        &self,
        symbol: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<MarketAwarePrediction, PredictionError> {
        let instrument_id = self
            .ctx
            .identity
            .resolve_strict(symbol)
            .await
            .map_err(PredictionError::TransientIo)?
            .ok_or_else(|| PredictionError::IdentityNotFound {
                symbol: symbol.to_string(),
            })?;

        let now = self.ctx.clock.now();
        let status = self
            .ctx
            .market_status
            .get_status(&instrument_id, now)
            .await
            .map_err(PredictionError::TransientIo)?;

        if status.is_trading {
            let prediction = self.generate(symbol, hour_start).await?;
            return Ok(MarketAwarePrediction {
                requested_hour: hour_start,
                resolved_hour: hour_start,
                reused: false,
                prediction,
            });
        }

        let resolved_hour = self
            .ctx
            .market_status
            .last_trading_hour(&instrument_id, hour_start)
            .await
            .map_err(PredictionError::TransientIo)?
            .ok_or_else(|| {
                PredictionError::data_unavailable(
                    &instrument_id,
                    format!("no trading occurrence of {} in the past week", hour_start),
                )
            })?;
        debug!(
            "PredictionOrchestrator: {} market closed ({}), using {} for {}",
            instrument_id, status.session_kind, resolved_hour, hour_start
        );

        if let Some(existing) = self
            .ctx
            .repository
            .get_by_hour(&instrument_id, resolved_hour)
            .await
            .map_err(PredictionError::TransientIo)?
        {
            return Ok(MarketAwarePrediction {
                requested_hour: hour_start,
                resolved_hour,
                reused: true,
                prediction: existing,
            });
        }

        let prediction = self.generate(symbol, resolved_hour).await?;
        Ok(MarketAwarePrediction {
            requested_hour: hour_start,
            resolved_hour,
            reused: false,
            prediction,
        })
    }
}
