use crate::domain::market::bar::Bar;
use crate::domain::market::session::MarketStatus;
use crate::domain::market::timeframe::Timeframe;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Historical OHLCV bars for an instrument.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Bars with `start <= timestamp < end`, ascending. Empty when the
    /// provider has nothing for the window.
    async fn fetch_bars(
        &self,
        instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>>;
}

/// Maps user-facing symbols to stable instrument ids.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the symbol is unknown. Never falls back to the input.
    async fn resolve_strict(&self, symbol: &str) -> Result<Option<String>>;

    /// Best effort for read paths: the stable id if known, else the symbol.
    async fn resolve(&self, symbol: &str) -> String {
        match self.resolve_strict(symbol).await {
            Ok(Some(id)) => id,
            _ => symbol.to_string(),
        }
    }
}

#[async_trait]
pub trait MarketStatusProvider: Send + Sync {
    async fn get_status(&self, instrument_id: &str, at: DateTime<Utc>) -> Result<MarketStatus>;

    /// Most recent hour (at or before `hour_start`, same clock hour) in which
    /// the instrument traded at the prediction point.
    async fn last_trading_hour(
        &self,
        instrument_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;
}

/// Upstream volatility statistic, in price units.
#[async_trait]
pub trait VolatilityProvider: Send + Sync {
    /// `Ok(None)` when there is not enough history to compute it.
    async fn volatility(&self, instrument_id: &str, hour_start: DateTime<Utc>)
    -> Result<Option<f64>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Raised after a job fails repeatedly.
#[derive(Debug, Clone)]
pub struct JobAlert {
    pub job: String,
    pub consecutive_failures: u32,
    pub last_error: String,
    pub raised_at: DateTime<Utc>,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: &JobAlert) -> Result<()>;
}
