//! Market data provider configuration parsing from environment variables.

use super::EnvSource;

/// Binance API configuration
#[derive(Debug, Clone, Default)]
pub struct BinanceConfig {
    pub api_key: String,
    pub base_url: String,
}

impl BinanceConfig {
    pub fn from_source(source: &EnvSource) -> Self {
        Self {
            api_key: source.get("BINANCE_API_KEY").unwrap_or_default(),
            base_url: source.get_or("BINANCE_BASE_URL", "https://api.binance.com"),
        }
    }
}

/// Broker environment configuration
#[derive(Debug, Clone, Default)]
pub struct BrokerEnvConfig {
    pub binance: BinanceConfig,
}

impl BrokerEnvConfig {
    pub fn from_source(source: &EnvSource) -> Self {
        Self {
            binance: BinanceConfig::from_source(source),
        }
    }
}
