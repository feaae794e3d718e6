//! Three-tree decision logic and confidence scoring.
//!
//! The tree is picked once from `(counter, early bias)`; each arm is a pure
//! function of the block-5 deviation and the bias it carries.

use crate::domain::errors::PredictionError;
use crate::domain::prediction::counter::CounterDetector;
use crate::domain::prediction::early_bias::{EarlyBiasClassifier, NEUTRAL_THRESHOLD};
use crate::domain::prediction::types::{
    ANALYSIS_BLOCKS, Block, CounterSignal, DecisionTree, Direction, EarlyBias, Strength,
};

/// |deviation| at or above this is a strong move.
pub const STRONG_THRESHOLD: f64 = 2.0;

/// Early-bias strength needed to call a sub-2σ continuation moderate.
pub const BIAS_CONVICTION_THRESHOLD: f64 = 1.0;

/// |deviation| below this counts as a quiet hour for confidence purposes.
pub const QUIET_THRESHOLD: f64 = 0.25;

pub const MIN_CONFIDENCE: f64 = 5.0;
pub const MAX_CONFIDENCE: f64 = 95.0;
const QUIET_CONFIDENCE_FLOOR: f64 = 20.0;

/// Strength tier of a deviation magnitude, using the 0.5 / 2.0 thresholds.
pub fn classify_strength(deviation: f64) -> Strength {
    let a = deviation.abs();
    if a >= STRONG_THRESHOLD {
        Strength::Strong
    } else if a >= NEUTRAL_THRESHOLD {
        Strength::Moderate
    } else {
        Strength::Weak
    }
}

/// Direction implied by a deviation on its own: neutral inside ±0.5, else
/// its sign. Used for the neutral-bias tree and for realized outcomes.
pub fn direction_from_deviation(deviation: f64) -> Direction {
    if deviation.abs() < NEUTRAL_THRESHOLD {
        Direction::Neutral
    } else if deviation > 0.0 {
        Direction::Up
    } else {
        Direction::Down
    }
}

/// The selected tree together with the inputs only that tree needs.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TreeCase {
    Reversal { counter: Direction },
    NeutralBias,
    Continuation { bias: Direction, bias_strength: f64 },
}

impl TreeCase {
    fn select(early_bias: &EarlyBias, counter: &CounterSignal) -> Self {
        match (counter.direction, early_bias.direction) {
            (Some(counter), _) => TreeCase::Reversal { counter },
            (None, Direction::Neutral) => TreeCase::NeutralBias,
            (None, bias) => TreeCase::Continuation {
                bias,
                bias_strength: early_bias.strength,
            },
        }
    }

    fn tree(&self) -> DecisionTree {
        match self {
            TreeCase::Reversal { .. } => DecisionTree::Reversal,
            TreeCase::NeutralBias => DecisionTree::NeutralBias,
            TreeCase::Continuation { .. } => DecisionTree::Continuation,
        }
    }

    fn decide(&self, deviation: f64) -> (Direction, Strength) {
        let a = deviation.abs();
        match *self {
            TreeCase::Reversal { counter } => {
                if a < NEUTRAL_THRESHOLD {
                    (Direction::Neutral, Strength::Weak)
                } else if a < STRONG_THRESHOLD {
                    (counter, Strength::Moderate)
                } else {
                    (counter, Strength::Strong)
                }
            }
            TreeCase::NeutralBias => {
                let direction = direction_from_deviation(deviation);
                if direction == Direction::Neutral {
                    (Direction::Neutral, Strength::Weak)
                } else if a < STRONG_THRESHOLD {
                    (direction, Strength::Moderate)
                } else {
                    (direction, Strength::Strong)
                }
            }
            TreeCase::Continuation {
                bias,
                bias_strength,
            } => {
                if a >= STRONG_THRESHOLD {
                    (bias, Strength::Strong)
                } else if bias_strength >= BIAS_CONVICTION_THRESHOLD {
                    (bias, Strength::Moderate)
                } else {
                    (bias, Strength::Weak)
                }
            }
        }
    }
}

/// Confidence score in `[5, 95]`, rounded to one decimal.
pub fn confidence(
    direction: Direction,
    strength: Strength,
    early_bias: Direction,
    counter: Option<Direction>,
    deviation: f64,
) -> f64 {
    let a = deviation.abs();
    let mut score: f64 = match strength {
        Strength::Strong => 85.0,
        Strength::Moderate => 65.0,
        Strength::Weak => 35.0,
    };

    if direction.is_directional() && early_bias == direction {
        score += 10.0;
    }
    if counter == Some(direction) {
        score += 5.0;
    }
    if a >= STRONG_THRESHOLD {
        score = (score + 10.0).min(MAX_CONFIDENCE);
    }
    if a < QUIET_THRESHOLD {
        score = (score - 5.0).max(QUIET_CONFIDENCE_FLOOR);
    }

    let clamped = score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
    (clamped * 10.0).round() / 10.0
}

/// Everything the engine derives from blocks 1-5.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSignal {
    pub direction: Direction,
    pub strength: Strength,
    pub confidence: f64,
    pub decision_tree: DecisionTree,
    pub early_bias: EarlyBias,
    pub counter: CounterSignal,
    pub deviation_at_5of7: f64,
}

pub struct PredictionEngine;

impl PredictionEngine {
    /// Runs bias classification, counter detection and the decision tree.
    ///
    /// `blocks` must contain blocks 1 through 5; extra blocks are ignored.
    pub fn predict(
        blocks: &[&Block],
        hour_open: f64,
        volatility: f64,
    ) -> Result<PredictionSignal, PredictionError> {
        if !volatility.is_finite() || volatility <= 0.0 {
            return Err(PredictionError::invalid_input(format!(
                "volatility must be positive, got {}",
                volatility
            )));
        }

        let mut window: Vec<&Block> = Vec::with_capacity(ANALYSIS_BLOCKS);
        for number in 1..=ANALYSIS_BLOCKS as u8 {
            match blocks.iter().find(|b| b.number == number) {
                Some(block) => window.push(*block),
                None => {
                    return Err(PredictionError::invalid_input(format!(
                        "need blocks 1-{}, block {} missing ({} supplied)",
                        ANALYSIS_BLOCKS,
                        number,
                        blocks.len()
                    )));
                }
            }
        }

        let early_bias = EarlyBiasClassifier::classify(window[0], window[1], hour_open, volatility)?;
        let counter = CounterDetector::detect(&window[2..5], early_bias.direction);
        let deviation_at_5of7 = window[4].deviation_from_open;

        let case = TreeCase::select(&early_bias, &counter);
        let (direction, strength) = case.decide(deviation_at_5of7);
        let confidence = confidence(
            direction,
            strength,
            early_bias.direction,
            counter.direction,
            deviation_at_5of7,
        );

        Ok(PredictionSignal {
            direction,
            strength,
            confidence,
            decision_tree: case.tree(),
            early_bias,
            counter,
            deviation_at_5of7,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const OPEN: f64 = 15000.0;
    const VOL: f64 = 25.0;

    fn block(number: u8, open: f64, close: f64, below: f64, crosses_open: bool) -> Block {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Block {
            number,
            start_time: t,
            end_time: t,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1.0,
            deviation_from_open: (close - OPEN) / VOL,
            crosses_open,
            time_above_open: 1.0 - below,
            time_below_open: below,
            bar_count: 8,
        }
    }

    /// Blocks whose closes produce the given block-2 and block-5 deviations
    /// with no counter activity in between.
    fn quiet_hour(d2: f64, d5: f64) -> Vec<Block> {
        let c2 = OPEN + d2 * VOL;
        let c5 = OPEN + d5 * VOL;
        vec![
            block(1, OPEN, OPEN, 0.0, false),
            block(2, OPEN, c2, 0.0, false),
            block(3, c2, c2, 0.0, false),
            block(4, c2, c2, 0.0, false),
            block(5, c2, c5, 0.0, false),
        ]
    }

    fn run(blocks: &[Block]) -> PredictionSignal {
        let refs: Vec<&Block> = blocks.iter().collect();
        PredictionEngine::predict(&refs, OPEN, VOL).unwrap()
    }

    #[test]
    fn test_worked_reversal_scenario() {
        let blocks = vec![
            block(1, 15002.0, 15008.0, 0.0, false),
            block(2, 15008.0, 15020.0, 0.0, false),
            block(3, 15010.0, 14990.0, 0.6, false),
            block(4, 14990.0, 14970.0, 1.0, false),
            block(5, 14970.0, 14950.0, 1.0, false),
        ];

        let signal = run(&blocks);
        assert_eq!(signal.early_bias.direction, Direction::Up);
        assert!((signal.early_bias.strength - 0.8).abs() < 1e-9);
        assert_eq!(signal.counter.direction, Some(Direction::Down));
        assert_eq!(signal.counter.trigger_block, Some(3));
        assert_eq!(signal.deviation_at_5of7, -2.0);
        assert_eq!(signal.decision_tree, DecisionTree::Reversal);
        assert_eq!(signal.direction, Direction::Down);
        assert_eq!(signal.strength, Strength::Strong);
        assert_eq!(signal.confidence, 95.0);
    }

    #[test]
    fn test_classify_strength_boundaries() {
        assert_eq!(classify_strength(2.0), Strength::Strong);
        assert_eq!(classify_strength(-2.0), Strength::Strong);
        assert_eq!(classify_strength(0.5), Strength::Moderate);
        assert_eq!(classify_strength(1.999), Strength::Moderate);
        assert_eq!(classify_strength(0.499), Strength::Weak);
        assert_eq!(classify_strength(0.0), Strength::Weak);
    }

    #[test]
    fn test_reversal_tree_tiers() {
        let counter = TreeCase::Reversal {
            counter: Direction::Up,
        };
        assert_eq!(counter.decide(0.49), (Direction::Neutral, Strength::Weak));
        assert_eq!(counter.decide(-0.5), (Direction::Up, Strength::Moderate));
        assert_eq!(counter.decide(1.99), (Direction::Up, Strength::Moderate));
        assert_eq!(counter.decide(2.0), (Direction::Up, Strength::Strong));
    }

    #[test]
    fn test_neutral_bias_tree_follows_sign() {
        let tree = TreeCase::NeutralBias;
        assert_eq!(tree.decide(0.3), (Direction::Neutral, Strength::Weak));
        assert_eq!(tree.decide(0.5), (Direction::Up, Strength::Moderate));
        assert_eq!(tree.decide(-0.5), (Direction::Down, Strength::Moderate));
        assert_eq!(tree.decide(-2.5), (Direction::Down, Strength::Strong));
    }

    #[test]
    fn test_continuation_tree_uses_bias_strength() {
        let strong_bias = TreeCase::Continuation {
            bias: Direction::Down,
            bias_strength: 1.0,
        };
        let weak_bias = TreeCase::Continuation {
            bias: Direction::Down,
            bias_strength: 0.9,
        };
        assert_eq!(strong_bias.decide(-2.0), (Direction::Down, Strength::Strong));
        assert_eq!(strong_bias.decide(0.1), (Direction::Down, Strength::Moderate));
        assert_eq!(weak_bias.decide(-1.5), (Direction::Down, Strength::Weak));
        // Continuation keeps the bias even when block 5 sits on the other side
        assert_eq!(weak_bias.decide(3.0), (Direction::Down, Strength::Strong));
    }

    #[test]
    fn test_neutral_early_bias_runs_tree_two() {
        let signal = run(&quiet_hour(0.2, 1.2));
        assert_eq!(signal.decision_tree, DecisionTree::NeutralBias);
        assert_eq!(signal.direction, Direction::Up);
        assert_eq!(signal.strength, Strength::Moderate);
        assert!(!signal.counter.has_counter());
        // 65, no bias alignment, no counter
        assert_eq!(signal.confidence, 65.0);
    }

    #[test]
    fn test_continuation_confidence() {
        let signal = run(&quiet_hour(1.2, 0.8));
        assert_eq!(signal.decision_tree, DecisionTree::Continuation);
        assert_eq!(signal.direction, Direction::Up);
        assert_eq!(signal.strength, Strength::Moderate);
        // 65 + 10 alignment
        assert_eq!(signal.confidence, 75.0);
    }

    #[test]
    fn test_confidence_quiet_hour_penalty() {
        // Weak neutral call in a flat hour: 35 - 5
        assert_eq!(
            confidence(Direction::Neutral, Strength::Weak, Direction::Neutral, None, 0.1),
            30.0
        );
        // Weak continuation in a flat hour: 35 + 10 - 5
        assert_eq!(
            confidence(Direction::Up, Strength::Weak, Direction::Up, None, 0.1),
            40.0
        );
        // Neutral direction never earns the alignment bonus
        assert_eq!(
            confidence(Direction::Neutral, Strength::Weak, Direction::Neutral, None, 0.3),
            35.0
        );
    }

    #[test]
    fn test_confidence_always_in_range() {
        let directions = [Direction::Up, Direction::Down, Direction::Neutral];
        let strengths = [Strength::Weak, Strength::Moderate, Strength::Strong];
        let counters = [None, Some(Direction::Up), Some(Direction::Down)];
        let deviations = [-5.0, -2.0, -0.3, 0.0, 0.1, 0.24, 0.25, 0.5, 1.99, 2.0, 9.0];

        for direction in directions {
            for strength in strengths {
                for bias in directions {
                    for counter in counters {
                        for deviation in deviations {
                            let c = confidence(direction, strength, bias, counter, deviation);
                            assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_requires_five_blocks() {
        let blocks = quiet_hour(1.0, 1.0);
        let refs: Vec<&Block> = blocks.iter().take(4).collect();
        assert!(matches!(
            PredictionEngine::predict(&refs, OPEN, VOL),
            Err(PredictionError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_volatility() {
        let blocks = quiet_hour(1.0, 1.0);
        let refs: Vec<&Block> = blocks.iter().collect();
        assert!(PredictionEngine::predict(&refs, OPEN, 0.0).is_err());
    }
}
