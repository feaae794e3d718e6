//! Trading session calendars.
//!
//! Pure logic, no IO. A [`MarketCalendar`] answers "is this instrument trading
//! at instant `t`" and finds the most recent trading occurrence of a given
//! clock hour. Exchange holidays are not modelled; weekends and session hours
//! are.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    /// 24/7 market (crypto)
    Continuous,
    /// Inside regular trading hours
    Regular,
    Closed,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Continuous => write!(f, "continuous"),
            SessionKind::Regular => write!(f, "regular"),
            SessionKind::Closed => write!(f, "closed"),
        }
    }
}

/// Snapshot of an instrument's market state at an instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub is_trading: bool,
    pub timezone: String,
    pub session_kind: SessionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketCalendar {
    /// Trades around the clock.
    AlwaysOn,
    /// Weekdays 09:30–16:00 America/New_York.
    UsEquity,
    /// Sunday 17:00 to Friday 17:00 America/New_York.
    Forex,
}

impl MarketCalendar {
    pub fn timezone(&self) -> Tz {
        match self {
            MarketCalendar::AlwaysOn => chrono_tz::UTC,
            MarketCalendar::UsEquity | MarketCalendar::Forex => chrono_tz::America::New_York,
        }
    }

    pub fn is_trading(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.timezone());
        let time = local.time();

        match self {
            MarketCalendar::AlwaysOn => true,
            MarketCalendar::UsEquity => {
                let open = NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default();
                let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default();
                !matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
                    && time >= open
                    && time < close
            }
            MarketCalendar::Forex => {
                let roll = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default();
                match local.weekday() {
                    Weekday::Sat => false,
                    Weekday::Sun => time >= roll,
                    Weekday::Fri => time < roll,
                    _ => true,
                }
            }
        }
    }

    pub fn status_at(&self, at: DateTime<Utc>) -> MarketStatus {
        let is_trading = self.is_trading(at);
        let session_kind = match (self, is_trading) {
            (MarketCalendar::AlwaysOn, _) => SessionKind::Continuous,
            (_, true) => SessionKind::Regular,
            (_, false) => SessionKind::Closed,
        };

        MarketStatus {
            is_trading,
            timezone: self.timezone().name().to_string(),
            session_kind,
        }
    }

    /// Walks back from `hour_start` one day at a time (same UTC clock hour)
    /// and returns the first hour whose prediction point falls inside a
    /// trading session. `hour_start` itself is the first candidate.
    pub fn last_trading_hour(
        &self,
        hour_start: DateTime<Utc>,
        prediction_offset: Duration,
        max_days_back: u32,
    ) -> Option<DateTime<Utc>> {
        (0..=max_days_back as i64)
            .map(|days| hour_start - Duration::days(days))
            .find(|candidate| self.is_trading(*candidate + prediction_offset))
    }
}

impl FromStr for MarketCalendar {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" | "alwayson" | "crypto" | "24/7" => Ok(MarketCalendar::AlwaysOn),
            "us_equity" | "usequity" | "equity" | "stock" => Ok(MarketCalendar::UsEquity),
            "forex" | "fx" => Ok(MarketCalendar::Forex),
            _ => anyhow::bail!(
                "Invalid market calendar: {}. Must be 'crypto', 'equity' or 'forex'",
                s
            ),
        }
    }
}

/// Truncates an instant to the start of its UTC hour.
pub fn floor_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), at.day(), at.hour(), 0, 0)
        .single()
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_us_equity_session_hours() {
        let cal = MarketCalendar::UsEquity;
        // Wednesday 2024-03-13, EDT (UTC-4): 14:00 UTC = 10:00 NY
        assert!(cal.is_trading(utc(2024, 3, 13, 14, 0)));
        // 13:29 UTC = 09:29 NY, before the open
        assert!(!cal.is_trading(utc(2024, 3, 13, 13, 29)));
        // 20:00 UTC = 16:00 NY, close is exclusive
        assert!(!cal.is_trading(utc(2024, 3, 13, 20, 0)));
        // Saturday
        assert!(!cal.is_trading(utc(2024, 3, 16, 15, 0)));
    }

    #[test]
    fn test_forex_weekend_gap() {
        let cal = MarketCalendar::Forex;
        // Friday 2024-03-15 20:59 UTC = 16:59 NY, still open
        assert!(cal.is_trading(utc(2024, 3, 15, 20, 59)));
        // Friday 21:00 UTC = 17:00 NY, closed
        assert!(!cal.is_trading(utc(2024, 3, 15, 21, 0)));
        // Sunday 21:00 UTC = 17:00 NY, reopened
        assert!(cal.is_trading(utc(2024, 3, 17, 21, 0)));
    }

    #[test]
    fn test_always_on_status_is_continuous() {
        let status = MarketCalendar::AlwaysOn.status_at(utc(2024, 3, 16, 3, 0));
        assert!(status.is_trading);
        assert_eq!(status.session_kind, SessionKind::Continuous);
        assert_eq!(status.timezone, "UTC");
    }

    #[test]
    fn test_last_trading_hour_skips_weekend() {
        let cal = MarketCalendar::UsEquity;
        let offset = Duration::milliseconds(3_600_000 * 5 / 7);
        // Sunday 2024-03-17 15:00 UTC (11:00 NY) -> Friday 2024-03-15 15:00 UTC
        let found = cal.last_trading_hour(utc(2024, 3, 17, 15, 0), offset, 7);
        assert_eq!(found, Some(utc(2024, 3, 15, 15, 0)));
    }

    #[test]
    fn test_last_trading_hour_returns_requested_hour_when_open() {
        let cal = MarketCalendar::UsEquity;
        let offset = Duration::milliseconds(3_600_000 * 5 / 7);
        let hour = utc(2024, 3, 13, 15, 0);
        assert_eq!(cal.last_trading_hour(hour, offset, 7), Some(hour));
    }

    #[test]
    fn test_last_trading_hour_none_outside_session_hours() {
        let cal = MarketCalendar::UsEquity;
        let offset = Duration::milliseconds(3_600_000 * 5 / 7);
        // 03:00 UTC is never inside the NY session
        assert_eq!(cal.last_trading_hour(utc(2024, 3, 13, 3, 0), offset, 7), None);
    }

    #[test]
    fn test_floor_to_hour() {
        let at = Utc.with_ymd_and_hms(2024, 3, 13, 14, 42, 51).unwrap();
        assert_eq!(floor_to_hour(at), utc(2024, 3, 13, 14, 0));
    }
}
