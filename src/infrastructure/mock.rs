use crate::domain::market::bar::Bar;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{AlertSink, BarSource, Clock, JobAlert, VolatilityProvider};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Bar source for tests and offline runs.
///
/// Scripted instruments return exactly the bars they were given (filtered to
/// the requested window). Unscripted instruments get a deterministic
/// synthetic path when simulation is enabled, so generation and verification
/// of the same hour see the same prices.
#[derive(Clone)]
pub struct MockBarSource {
    scripted: Arc<RwLock<HashMap<String, Vec<Bar>>>>,
    fetch_count: Arc<AtomicUsize>,
    failures_remaining: Arc<AtomicU32>,
    pub simulation_enabled: bool,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self {
            scripted: Arc::new(RwLock::new(HashMap::new())),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            failures_remaining: Arc::new(AtomicU32::new(0)),
            simulation_enabled: true,
        }
    }

    pub fn new_no_sim() -> Self {
        Self {
            simulation_enabled: false,
            ..Self::new()
        }
    }

    /// Adds bars for an instrument, keeping them sorted by timestamp.
    pub async fn push_bars(&self, instrument_id: &str, bars: Vec<Bar>) {
        let mut scripted = self.scripted.write().await;
        let entry = scripted.entry(instrument_id.to_string()).or_default();
        entry.extend(bars);
        entry.sort_by_key(|b| b.timestamp);
    }

    /// The next `n` fetches fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    fn synthetic_bars(
        instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Vec<Bar> {
        let base_price = if instrument_id.contains("BTC") {
            96000.0
        } else if instrument_id.contains("ETH") {
            3400.0
        } else {
            150.0
        };
        let symbol_seed = instrument_id
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

        let step = timeframe.to_millis();
        let mut ts = timeframe.period_start(start.timestamp_millis());
        if ts < start.timestamp_millis() {
            ts += step;
        }

        let mut bars = Vec::new();
        while ts < end.timestamp_millis() {
            let period = ts / step;
            // Slow drift plus per-bar noise, both derived from the bar index only
            let drift = ((period as f64) / 37.0).sin() * 0.004;
            let mut rng = StdRng::seed_from_u64(symbol_seed ^ period as u64);
            let noise: f64 = rng.random_range(-0.0005..0.0005);
            let open = base_price * (1.0 + drift);
            let close = open * (1.0 + noise);
            let wick: f64 = rng.random_range(0.0..0.0003);
            let high = open.max(close) * (1.0 + wick);
            let low = open.min(close) * (1.0 - wick);
            let volume: f64 = rng.random_range(1.0..10.0);

            bars.push(Bar {
                symbol: instrument_id.to_string(),
                open: Decimal::from_f64(open).unwrap_or(Decimal::ZERO),
                high: Decimal::from_f64(high).unwrap_or(Decimal::ZERO),
                low: Decimal::from_f64(low).unwrap_or(Decimal::ZERO),
                close: Decimal::from_f64(close).unwrap_or(Decimal::ZERO),
                volume: Decimal::from_f64(volume).unwrap_or(Decimal::ZERO),
                timestamp: ts,
            });
            ts += step;
        }
        bars
    }
}

impl Default for MockBarSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarSource for MockBarSource {
    async fn fetch_bars(
        &self,
        instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("MockBarSource: simulated connection reset"));
        }

        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
        if let Some(bars) = self.scripted.read().await.get(instrument_id) {
            let window: Vec<Bar> = bars
                .iter()
                .filter(|b| b.timestamp >= start_ms && b.timestamp < end_ms)
                .cloned()
                .collect();
            debug!(
                "MockBarSource: Serving {} scripted bars for {}",
                window.len(),
                instrument_id
            );
            return Ok(window);
        }

        if !self.simulation_enabled {
            return Ok(Vec::new());
        }

        let bars = Self::synthetic_bars(instrument_id, start, end, timeframe);
        info!(
            "MockBarSource: Generated {} synthetic bars for {}",
            bars.len(),
            instrument_id
        );
        Ok(bars)
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now_ms.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Returns the same volatility for every instrument and hour.
pub struct FixedVolatilityProvider {
    value: Option<f64>,
}

impl FixedVolatilityProvider {
    pub fn new(value: f64) -> Self {
        Self { value: Some(value) }
    }

    /// Provider with no history, as for a newly listed instrument.
    pub fn unavailable() -> Self {
        Self { value: None }
    }
}

#[async_trait]
impl VolatilityProvider for FixedVolatilityProvider {
    async fn volatility(
        &self,
        _instrument_id: &str,
        _hour_start: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        Ok(self.value)
    }
}

/// Collects raised alerts for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: RwLock<Vec<JobAlert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<JobAlert> {
        self.alerts.read().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn raise(&self, alert: &JobAlert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_scripted_bars_are_windowed() {
        let source = MockBarSource::new_no_sim();
        let base = hour().timestamp_millis();
        let bars = (0..3)
            .map(|i| Bar {
                symbol: "BTC/USDT".to_string(),
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100),
                volume: dec!(1),
                timestamp: base + i * 60_000,
            })
            .collect();
        source.push_bars("BTC/USDT", bars).await;

        let fetched = source
            .fetch_bars(
                "BTC/USDT",
                hour() + Duration::minutes(1),
                hour() + Duration::minutes(2),
                Timeframe::OneMin,
            )
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].timestamp, base + 60_000);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_synthetic_bars_are_deterministic() {
        let source = MockBarSource::new();
        let end = hour() + Duration::hours(1);

        let first = source
            .fetch_bars("ETH/USDT", hour(), end, Timeframe::OneMin)
            .await
            .unwrap();
        let second = source
            .fetch_bars("ETH/USDT", hour(), end, Timeframe::OneMin)
            .await
            .unwrap();

        assert_eq!(first.len(), 60);
        assert_eq!(first, second);
        assert!(first.iter().all(|b| b.low <= b.open && b.open <= b.high));
    }

    #[tokio::test]
    async fn test_fail_next() {
        let source = MockBarSource::new_no_sim();
        source.fail_next(1);
        let end = hour() + Duration::hours(1);

        assert!(
            source
                .fetch_bars("BTC/USDT", hour(), end, Timeframe::OneMin)
                .await
                .is_err()
        );
        assert!(
            source
                .fetch_bars("BTC/USDT", hour(), end, Timeframe::OneMin)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(hour());
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), hour() + Duration::minutes(90));
    }
}
