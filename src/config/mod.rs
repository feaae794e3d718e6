//! Configuration module for Hourcast.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by domain: Prediction, Scheduler, Broker, and Observability.

mod broker_config;
mod observability_config;
mod prediction_config;
mod scheduler_config;

pub use broker_config::{BinanceConfig, BrokerEnvConfig};
pub use observability_config::ObservabilityEnvConfig;
pub use prediction_config::PredictionEnvConfig;
pub use scheduler_config::{MarketGateMode, RetryEnvConfig, SchedulerEnvConfig};

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Application execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Binance,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "binance" => Ok(Mode::Binance),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'binance'", s),
        }
    }
}

/// Key/value source for configuration. The process environment in
/// production, a map in tests.
pub struct EnvSource {
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvSource {
    pub fn process() -> Self {
        Self {
            lookup: Box::new(|key| env::var(key).ok()),
        }
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |key| map.get(key).cloned()),
        }
    }

    /// Raw value; empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parses `key`, falling back to `default` when unset. A present but
    /// unparsable value is an error.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("Failed to parse {}={}", key, raw)),
            None => Ok(default),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub database_url: String,
    pub prediction: PredictionEnvConfig,
    pub scheduler: SchedulerEnvConfig,
    pub broker: BrokerEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::process())
    }

    /// Compose all sub-configs. Invalid values are errors; absent values use
    /// defaults.
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let mode = Mode::from_str(&source.get_or("MODE", "mock"))?;
        let database_url = source.get_or("DATABASE_URL", "sqlite://hourcast.db");

        let prediction =
            PredictionEnvConfig::from_source(source).context("Failed to load prediction config")?;
        let scheduler =
            SchedulerEnvConfig::from_source(source).context("Failed to load scheduler config")?;
        let broker = BrokerEnvConfig::from_source(source);
        let observability = ObservabilityEnvConfig::from_source(source)
            .context("Failed to load observability config")?;

        Ok(Self {
            mode,
            database_url,
            prediction,
            scheduler,
            broker,
            observability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;

    fn source(pairs: &[(&str, &str)]) -> EnvSource {
        EnvSource::from_map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(&source(&[])).unwrap();

        assert_eq!(config.mode, Mode::Mock);
        assert_eq!(config.database_url, "sqlite://hourcast.db");
        assert_eq!(config.prediction.symbols, vec!["BTC/USDT".to_string()]);
        assert_eq!(config.prediction.bar_timeframe, Timeframe::OneMin);
        assert_eq!(config.scheduler.generation_minute, 42);
        assert_eq!(config.scheduler.generation_second, 51);
        assert_eq!(config.scheduler.max_workers, 3);
        assert_eq!(config.scheduler.market_gate, MarketGateMode::Skip);
        assert_eq!(config.broker.binance.base_url, "https://api.binance.com");
        assert!(config.observability.enabled);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_source(&source(&[
            ("MODE", "binance"),
            ("SYMBOLS", "btcusdt, ETH/USDT"),
            ("BAR_TIMEFRAME", "5Min"),
            ("VERIFICATION_BUFFER_MINUTES", "10"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("MARKET_GATE", "fail"),
        ]))
        .unwrap();

        assert_eq!(config.mode, Mode::Binance);
        assert_eq!(config.prediction.symbols, vec!["BTCUSDT", "ETH/USDT"]);
        assert_eq!(config.prediction.bar_timeframe, Timeframe::FiveMin);
        assert_eq!(config.prediction.verification_buffer_minutes, 10);
        assert_eq!(config.scheduler.retry.max_attempts, 5);
        assert_eq!(config.scheduler.market_gate, MarketGateMode::Fail);
    }

    #[test]
    fn test_verification_tick_against_buffer() {
        let defaults = Config::from_source(&source(&[])).unwrap();
        assert!(
            !defaults
                .scheduler
                .verifies_previous_hour_on_time(defaults.prediction.verification_buffer_minutes)
        );

        let shifted = Config::from_source(&source(&[("VERIFICATION_MINUTE", "6")])).unwrap();
        assert!(
            shifted
                .scheduler
                .verifies_previous_hour_on_time(shifted.prediction.verification_buffer_minutes)
        );
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        assert!(Config::from_source(&source(&[("MODE", "alpaca")])).is_err());
        assert!(Config::from_source(&source(&[("GENERATION_MINUTE", "61")])).is_err());
        assert!(Config::from_source(&source(&[("SCHEDULER_MAX_WORKERS", "zero")])).is_err());
        assert!(Config::from_source(&source(&[("BAR_TIMEFRAME", "1Hour")])).is_err());
        assert!(Config::from_source(&source(&[("SYMBOLS", " , ")])).is_err());
    }
}
