use crate::domain::prediction::types::{Block, CounterSignal, Direction};

/// Fraction of a block's bars that must sit on the counter side of the open.
pub const SUSTAIN_FRACTION: f64 = 0.5;

/// Looks for a sustained move against the early bias in blocks 3-5.
pub struct CounterDetector;

impl CounterDetector {
    /// `blocks` are scanned in the given order (3, 4, 5) and the first
    /// qualifying block is reported.
    pub fn detect(blocks: &[&Block], early_bias: Direction) -> CounterSignal {
        let counter_direction = match early_bias {
            Direction::Neutral => return CounterSignal::none(),
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        };

        blocks
            .iter()
            .find(|block| Self::counters(block, early_bias))
            .map(|block| CounterSignal::detected(counter_direction, block.number))
            .unwrap_or_default()
    }

    fn counters(block: &Block, early_bias: Direction) -> bool {
        match early_bias {
            Direction::Up => {
                block.close < block.open && block.time_below_open >= SUSTAIN_FRACTION
            }
            Direction::Down => {
                block.close > block.open && block.time_above_open >= SUSTAIN_FRACTION
            }
            Direction::Neutral => false,
        }
    }
}
