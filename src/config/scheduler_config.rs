//! Scheduler configuration parsing from environment variables.
//!
//! Trigger times, worker pool, misfire handling, retry policy and alerting.

use super::EnvSource;
use anyhow::{Result, bail};
use std::str::FromStr;

/// What a market-gated job does when the market is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketGateMode {
    Off,
    Skip,
    Fail,
}

impl FromStr for MarketGateMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(MarketGateMode::Off),
            "skip" => Ok(MarketGateMode::Skip),
            "fail" => Ok(MarketGateMode::Fail),
            _ => bail!("Invalid MARKET_GATE: {}. Must be 'off', 'skip' or 'fail'", s),
        }
    }
}

/// Job-level retry settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryEnvConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Fraction of the delay randomised either way (0 disables)
    pub jitter: f64,
}

/// Scheduler environment configuration
#[derive(Debug, Clone)]
pub struct SchedulerEnvConfig {
    pub generation_minute: u32,
    pub generation_second: u32,
    /// Verification tick within the hour. The default 00:00 lands before the
    /// verification buffer, so each finished hour is scored on the following
    /// tick, one hour late. Set it past the buffer (e.g. 06:00) to verify on
    /// the first tick.
    pub verification_minute: u32,
    pub verification_second: u32,
    pub max_workers: usize,
    pub misfire_grace_seconds: u64,
    pub job_soft_deadline_seconds: u64,
    pub retry: RetryEnvConfig,
    pub alert_after_failures: u32,
    pub market_gate: MarketGateMode,
}

impl SchedulerEnvConfig {
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let generation_minute = Self::parse_clock(source, "GENERATION_MINUTE", 42)?;
        let generation_second = Self::parse_clock(source, "GENERATION_SECOND", 51)?;
        let verification_minute = Self::parse_clock(source, "VERIFICATION_MINUTE", 0)?;
        let verification_second = Self::parse_clock(source, "VERIFICATION_SECOND", 0)?;

        let max_workers = source.parse_or("SCHEDULER_MAX_WORKERS", 3usize)?;
        if max_workers == 0 {
            bail!("SCHEDULER_MAX_WORKERS must be at least 1");
        }

        let retry = RetryEnvConfig {
            max_attempts: source.parse_or("RETRY_MAX_ATTEMPTS", 3u32)?,
            initial_delay_ms: source.parse_or("RETRY_INITIAL_DELAY_MS", 1000u64)?,
            multiplier: source.parse_or("RETRY_MULTIPLIER", 2.0f64)?,
            max_delay_ms: source.parse_or("RETRY_MAX_DELAY_MS", 30_000u64)?,
            jitter: source.parse_or("RETRY_JITTER", 0.1f64)?,
        };
        if retry.max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if retry.multiplier < 1.0 {
            bail!("RETRY_MULTIPLIER must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            bail!("RETRY_JITTER must be within [0, 1]");
        }

        let alert_after_failures = source.parse_or("ALERT_AFTER_FAILURES", 3u32)?;
        if alert_after_failures == 0 {
            bail!("ALERT_AFTER_FAILURES must be at least 1");
        }

        Ok(Self {
            generation_minute,
            generation_second,
            verification_minute,
            verification_second,
            max_workers,
            misfire_grace_seconds: source.parse_or("MISFIRE_GRACE_SECONDS", 60u64)?,
            job_soft_deadline_seconds: source.parse_or("JOB_SOFT_DEADLINE_SECONDS", 120u64)?,
            retry,
            alert_after_failures,
            market_gate: MarketGateMode::from_str(&source.get_or("MARKET_GATE", "skip"))?,
        })
    }

    /// Whether a verification tick already sees the hour that just ended,
    /// given the verification buffer.
    pub fn verifies_previous_hour_on_time(&self, buffer_minutes: i64) -> bool {
        let tick_seconds =
            i64::from(self.verification_minute) * 60 + i64::from(self.verification_second);
        tick_seconds >= buffer_minutes * 60
    }

    fn parse_clock(source: &EnvSource, key: &str, default: u32) -> Result<u32> {
        let value = source.parse_or(key, default)?;
        if value > 59 {
            bail!("{} must be within 0..=59, got {}", key, value);
        }
        Ok(value)
    }
}
