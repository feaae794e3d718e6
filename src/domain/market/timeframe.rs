use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar granularity requested from a bar source.
///
/// Block analysis needs several bars per block (a block lasts ~8.57 minutes),
/// so only sub-block granularities are accepted for prediction work.
/// `OneHour` exists for the volatility lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    OneHour,
}

impl Timeframe {
    /// Returns the duration of this timeframe in minutes
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::OneHour => 60,
        }
    }

    pub fn to_millis(&self) -> i64 {
        self.to_minutes() * 60_000
    }

    /// Converts to Binance API interval string
    pub fn to_binance_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::OneHour => "1h",
        }
    }

    /// True when at least one bar fits inside every 1/7-hour block.
    pub fn is_sub_block(&self) -> bool {
        // 3_600_000 / 7 ≈ 514_285 ms per block
        self.to_millis() < 3_600_000 / 7
    }

    /// Returns the start timestamp (ms) of the period containing the given timestamp
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.to_millis())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" | "onemin" => Ok(Timeframe::OneMin),
            "5m" | "5min" | "fivemin" => Ok(Timeframe::FiveMin),
            "1h" | "1hour" | "onehour" => Ok(Timeframe::OneHour),
            _ => Err(anyhow!(
                "Invalid timeframe: '{}'. Valid options: 1Min, 5Min, 1Hour",
                s
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::OneMin => write!(f, "1Min"),
            Timeframe::FiveMin => write!(f, "5Min"),
            Timeframe::OneHour => write!(f, "1Hour"),
        }
    }
}
