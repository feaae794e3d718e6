use crate::domain::market::session::{MarketCalendar, MarketStatus};
use crate::domain::ports::MarketStatusProvider;
use crate::domain::prediction::segmenter::prediction_offset;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// How far back `last_trading_hour` searches.
pub const MAX_LOOKBACK_DAYS: u32 = 7;

/// Calendar-backed market status. Instruments without an explicit calendar
/// use the default one.
pub struct SessionCalendar {
    default_calendar: MarketCalendar,
    overrides: HashMap<String, MarketCalendar>,
}

impl SessionCalendar {
    pub fn new(default_calendar: MarketCalendar) -> Self {
        Self {
            default_calendar,
            overrides: HashMap::new(),
        }
    }

    /// Crypto venues trade around the clock.
    pub fn crypto() -> Self {
        Self::new(MarketCalendar::AlwaysOn)
    }

    pub fn with_calendar(mut self, instrument_id: &str, calendar: MarketCalendar) -> Self {
        self.overrides.insert(instrument_id.to_string(), calendar);
        self
    }

    pub fn calendar_for(&self, instrument_id: &str) -> MarketCalendar {
        self.overrides
            .get(instrument_id)
            .copied()
            .unwrap_or(self.default_calendar)
    }
}

#[async_trait]
impl MarketStatusProvider for SessionCalendar {
    async fn get_status(&self, instrument_id: &str, at: DateTime<Utc>) -> Result<MarketStatus> {
        Ok(self.calendar_for(instrument_id).status_at(at))
    }

    async fn last_trading_hour(
        &self,
        instrument_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self.calendar_for(instrument_id).last_trading_hour(
            hour_start,
            prediction_offset(),
            MAX_LOOKBACK_DAYS,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::session::SessionKind;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_override_per_instrument() {
        let calendar = SessionCalendar::crypto().with_calendar("AAPL", MarketCalendar::UsEquity);
        // Saturday
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap();

        let btc = calendar.get_status("BTC/USDT", at).await.unwrap();
        assert!(btc.is_trading);
        assert_eq!(btc.session_kind, SessionKind::Continuous);

        let aapl = calendar.get_status("AAPL", at).await.unwrap();
        assert!(!aapl.is_trading);
        assert_eq!(aapl.timezone, "America/New_York");
    }

    #[tokio::test]
    async fn test_weekend_walks_back_to_friday() {
        let calendar = SessionCalendar::new(MarketCalendar::UsEquity);
        // Sunday 15:00 UTC is 11:00 in New York (EDT starts 2024-03-10)
        let sunday = Utc.with_ymd_and_hms(2024, 3, 3, 15, 0, 0).unwrap();

        let hour = calendar
            .last_trading_hour("AAPL", sunday)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hour, sunday - Duration::days(2));
    }
}
