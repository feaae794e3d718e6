use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{BarSource, VolatilityProvider};
use crate::domain::validation::StrictBarValidator;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use statrs::statistics::Statistics;
use std::sync::Arc;
use tracing::{debug, warn};

/// Volatility as the population standard deviation of hourly close-to-close
/// price changes over the hours preceding the target hour, in price units.
pub struct HistoricalVolatilityProvider {
    bar_source: Arc<dyn BarSource>,
    lookback_hours: i64,
}

impl HistoricalVolatilityProvider {
    pub fn new(bar_source: Arc<dyn BarSource>, lookback_hours: i64) -> Self {
        Self {
            bar_source,
            lookback_hours,
        }
    }
}

/// `None` with fewer than two closes or a flat series.
pub fn close_to_close_volatility(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let std_dev = changes.iter().population_std_dev();

    (std_dev.is_finite() && std_dev > 0.0).then_some(std_dev)
}

#[async_trait]
impl VolatilityProvider for HistoricalVolatilityProvider {
    async fn volatility(
        &self,
        instrument_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let start = hour_start - Duration::hours(self.lookback_hours);
        let bars = self
            .bar_source
            .fetch_bars(instrument_id, start, hour_start, Timeframe::OneHour)
            .await?;
        let bars = StrictBarValidator::retain_valid(bars);

        let closes: Vec<f64> = bars.iter().map(|b| b.close_f64()).collect();
        let volatility = close_to_close_volatility(&closes);

        match volatility {
            Some(v) => debug!(
                "HistoricalVolatilityProvider: {} volatility {:.4} over {} hourly closes",
                instrument_id,
                v,
                closes.len()
            ),
            None => warn!(
                "HistoricalVolatilityProvider: Not enough history for {} before {} ({} closes)",
                instrument_id,
                hour_start,
                closes.len()
            ),
        }
        Ok(volatility)
    }
}
