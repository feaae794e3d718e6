//! Observability configuration parsing from environment variables.

use super::EnvSource;
use anyhow::{Result, bail};

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    /// Seconds between JSON metric snapshots
    pub interval_seconds: u64,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let interval_seconds = source.parse_or("OBSERVABILITY_INTERVAL", 60u64)?;
        if interval_seconds == 0 {
            bail!("OBSERVABILITY_INTERVAL must be positive");
        }
        Ok(Self {
            enabled: source.parse_or("OBSERVABILITY_ENABLED", true)?,
            interval_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_observability_config_defaults() {
        let config = ObservabilityEnvConfig::from_source(&EnvSource::from_map(HashMap::new()))
            .unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval_seconds, 60);
    }
}
