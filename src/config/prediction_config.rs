//! Prediction pipeline configuration parsing from environment variables.
//!
//! Instruments, bar granularity, volatility lookback, and verification timing.

use super::EnvSource;
use crate::domain::market::session::MarketCalendar;
use crate::domain::market::timeframe::Timeframe;
use anyhow::{Result, bail};
use std::str::FromStr;

/// Prediction environment configuration
#[derive(Debug, Clone)]
pub struct PredictionEnvConfig {
    pub symbols: Vec<String>,
    /// Sub-block granularity used to build blocks
    pub bar_timeframe: Timeframe,
    pub volatility_lookback_hours: i64,
    /// Grace period after the hour closes before verification runs
    pub verification_buffer_minutes: i64,
    pub verify_batch_limit: usize,
    pub market_calendar: MarketCalendar,
}

impl PredictionEnvConfig {
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let symbols: Vec<String> = source
            .get_or("SYMBOLS", "BTC/USDT")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            bail!("SYMBOLS must list at least one instrument");
        }

        let bar_timeframe = Timeframe::from_str(&source.get_or("BAR_TIMEFRAME", "1Min"))?;
        if !bar_timeframe.is_sub_block() {
            bail!(
                "BAR_TIMEFRAME {} is coarser than one block; use 1Min or 5Min",
                bar_timeframe
            );
        }

        let volatility_lookback_hours = source.parse_or("VOLATILITY_LOOKBACK_HOURS", 24i64)?;
        if volatility_lookback_hours < 2 {
            bail!("VOLATILITY_LOOKBACK_HOURS must be at least 2");
        }

        let verification_buffer_minutes = source.parse_or("VERIFICATION_BUFFER_MINUTES", 5i64)?;
        if verification_buffer_minutes < 0 {
            bail!("VERIFICATION_BUFFER_MINUTES cannot be negative");
        }

        let verify_batch_limit = source.parse_or("VERIFY_BATCH_LIMIT", 100usize)?;
        if verify_batch_limit == 0 {
            bail!("VERIFY_BATCH_LIMIT must be positive");
        }

        let market_calendar = MarketCalendar::from_str(&source.get_or("MARKET_CALENDAR", "crypto"))?;

        Ok(Self {
            symbols,
            bar_timeframe,
            volatility_lookback_hours,
            verification_buffer_minutes,
            verify_batch_limit,
            market_calendar,
        })
    }
}
