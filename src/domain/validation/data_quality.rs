use crate::domain::market::bar::Bar;
use rust_decimal::Decimal;
use tracing::warn;

/// Centralized validator for bar integrity.
///
/// Rejects bars that are physically impossible (non-positive prices, inverted
/// ranges, negative volume) before they reach the segmenter.
pub struct StrictBarValidator;

impl StrictBarValidator {
    /// Validates a Bar. Returns true if valid, false otherwise.
    pub fn validate_bar(bar: &Bar) -> bool {
        if bar.open <= Decimal::ZERO
            || bar.high <= Decimal::ZERO
            || bar.low <= Decimal::ZERO
            || bar.close <= Decimal::ZERO
        {
            warn!(
                "Validation FAILED: Bar for {} at {} has non-positive price component(s)",
                bar.symbol, bar.timestamp
            );
            return false;
        }

        if bar.low > bar.high {
            warn!(
                "Validation FAILED: Bar for {} has low {} > high {}",
                bar.symbol, bar.low, bar.high
            );
            return false;
        }

        if bar.open > bar.high || bar.open < bar.low || bar.close > bar.high || bar.close < bar.low
        {
            warn!(
                "Validation FAILED: Bar for {} at {} has open/close outside [low, high]",
                bar.symbol, bar.timestamp
            );
            return false;
        }

        if bar.volume < Decimal::ZERO {
            warn!(
                "Validation FAILED: Bar for {} has negative volume: {}",
                bar.symbol, bar.volume
            );
            return false;
        }

        true
    }

    /// Keeps valid bars, logging each rejection.
    pub fn retain_valid(bars: Vec<Bar>) -> Vec<Bar> {
        let before = bars.len();
        let kept: Vec<Bar> = bars.into_iter().filter(Self::validate_bar).collect();
        if kept.len() < before {
            warn!("Dropped {} invalid bar(s) out of {}", before - kept.len(), before);
        }
        kept
    }
}
