use crate::domain::errors::PredictionError;
use crate::domain::prediction::types::{Block, Direction, EarlyBias};

/// Block-2 deviation below this magnitude means no early bias.
pub const NEUTRAL_THRESHOLD: f64 = 0.5;

/// Conviction multiplier when price came back to test the hour open.
const RETURNED_TO_OPEN_FACTOR: f64 = 0.5;

/// Derives the initial directional bias from blocks 1 and 2.
pub struct EarlyBiasClassifier;

impl EarlyBiasClassifier {
    pub fn classify(
        block1: &Block,
        block2: &Block,
        hour_open: f64,
        volatility: f64,
    ) -> Result<EarlyBias, PredictionError> {
        if !volatility.is_finite() || volatility <= 0.0 {
            return Err(PredictionError::invalid_input(format!(
                "volatility must be positive, got {}",
                volatility
            )));
        }
        if hour_open <= 0.0 {
            return Err(PredictionError::invalid_input(format!(
                "hour open must be positive, got {}",
                hour_open
            )));
        }

        let d2 = block2.deviation_from_open;
        let returned = block1.crosses_open || block2.crosses_open;

        if d2.abs() < NEUTRAL_THRESHOLD {
            return Ok(EarlyBias {
                direction: Direction::Neutral,
                strength: d2.abs(),
            });
        }

        let direction = if d2 > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        };
        let strength = if returned {
            d2.abs() * RETURNED_TO_OPEN_FACTOR
        } else {
            d2.abs()
        };

        Ok(EarlyBias {
            direction,
            strength,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn block(number: u8, deviation: f64, crosses_open: bool) -> Block {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Block {
            number,
            start_time: t,
            end_time: t,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 0.0,
            deviation_from_open: deviation,
            crosses_open,
            time_above_open: 0.0,
            time_below_open: 0.0,
            bar_count: 1,
        }
    }

    #[test]
    fn test_small_deviation_is_neutral() {
        let bias =
            EarlyBiasClassifier::classify(&block(1, 0.1, true), &block(2, -0.3, false), 100.0, 1.0)
                .unwrap();
        assert_eq!(bias.direction, Direction::Neutral);
        assert!((bias.strength - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_not_neutral() {
        let up = EarlyBiasClassifier::classify(&block(1, 0.2, false), &block(2, 0.5, false), 100.0, 1.0)
            .unwrap();
        assert_eq!(up.direction, Direction::Up);
        assert_eq!(up.strength, 0.5);

        let down =
            EarlyBiasClassifier::classify(&block(1, 0.0, false), &block(2, -0.5, false), 100.0, 1.0)
                .unwrap();
        assert_eq!(down.direction, Direction::Down);
        assert_eq!(down.strength, 0.5);
    }

    #[test]
    fn test_return_to_open_halves_strength() {
        let clean =
            EarlyBiasClassifier::classify(&block(1, 0.4, false), &block(2, 1.6, false), 100.0, 1.0)
                .unwrap();
        assert_eq!(clean.strength, 1.6);

        let tested =
            EarlyBiasClassifier::classify(&block(1, 0.4, true), &block(2, 1.6, false), 100.0, 1.0)
                .unwrap();
        assert_eq!(tested.direction, Direction::Up);
        assert!((tested.strength - 0.8).abs() < 1e-12);

        let down_tested =
            EarlyBiasClassifier::classify(&block(1, 0.0, false), &block(2, -1.2, true), 100.0, 1.0)
                .unwrap();
        assert_eq!(down_tested.direction, Direction::Down);
        assert!((down_tested.strength - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_volatility() {
        let result =
            EarlyBiasClassifier::classify(&block(1, 0.0, false), &block(2, 1.0, false), 100.0, 0.0);
        assert!(matches!(result, Err(PredictionError::InvalidInput { .. })));
    }
}
