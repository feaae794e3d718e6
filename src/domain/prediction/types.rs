use crate::domain::errors::PredictionError;
use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of equal blocks an hour is split into.
pub const BLOCK_COUNT: usize = 7;

/// Blocks 1..=5 feed the prediction; 6 and 7 verify it.
pub const ANALYSIS_BLOCKS: usize = 5;

pub const HOUR_MS: i64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn is_directional(&self) -> bool {
        !matches!(self, Direction::Neutral)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "NEUTRAL" => Ok(Direction::Neutral),
            _ => Err(anyhow!("Invalid direction: '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strength::Weak => write!(f, "weak"),
            Strength::Moderate => write!(f, "moderate"),
            Strength::Strong => write!(f, "strong"),
        }
    }
}

impl FromStr for Strength {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "weak" => Ok(Strength::Weak),
            "moderate" => Ok(Strength::Moderate),
            "strong" => Ok(Strength::Strong),
            _ => Err(anyhow!("Invalid strength: '{}'", s)),
        }
    }
}

/// Terminal verdict written once by verification. A pending prediction has
/// no verdict (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationResult {
    Correct,
    Wrong,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationResult::Correct => write!(f, "CORRECT"),
            VerificationResult::Wrong => write!(f, "WRONG"),
        }
    }
}

impl FromStr for VerificationResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_uppercase().as_str() {
            "CORRECT" => Ok(VerificationResult::Correct),
            "WRONG" => Ok(VerificationResult::Wrong),
            _ => Err(anyhow!("Invalid verification result: '{}'", s)),
        }
    }
}

/// Which of the three decision trees produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTree {
    /// A sustained counter against the early bias was seen in blocks 3-5.
    Reversal,
    /// Blocks 1-2 showed no bias and nothing countered.
    NeutralBias,
    /// The early bias held through block 5.
    Continuation,
}

impl fmt::Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionTree::Reversal => write!(f, "reversal"),
            DecisionTree::NeutralBias => write!(f, "neutral_bias"),
            DecisionTree::Continuation => write!(f, "continuation"),
        }
    }
}

impl FromStr for DecisionTree {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "reversal" => Ok(DecisionTree::Reversal),
            "neutral_bias" => Ok(DecisionTree::NeutralBias),
            "continuation" => Ok(DecisionTree::Continuation),
            _ => Err(anyhow!("Invalid decision tree: '{}'", s)),
        }
    }
}

/// Statistics for one 1/7-hour block.
///
/// Deviations are expressed in volatility units relative to the hour's
/// opening price, not the block's own open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1..=7
    pub number: u8,
    pub start_time: DateTime<Utc>,
    /// Exclusive
    pub end_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub deviation_from_open: f64,
    pub crosses_open: bool,
    pub time_above_open: f64,
    pub time_below_open: f64,
    pub bar_count: usize,
}

/// The seven block slots of one hour, indexed by block number - 1.
///
/// Slots for blocks without bars stay `None`, so a partial hour keeps its
/// shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    slots: [Option<Block>; BLOCK_COUNT],
}

impl Default for BlockSnapshot {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl BlockSnapshot {
    /// Builds a snapshot, rejecting out-of-range or duplicated block numbers.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, PredictionError> {
        let mut snapshot = Self::default();
        for block in blocks {
            let number = block.number as usize;
            if !(1..=BLOCK_COUNT).contains(&number) {
                return Err(PredictionError::invalid_input(format!(
                    "block number {} outside 1..={}",
                    number, BLOCK_COUNT
                )));
            }
            if snapshot.slots[number - 1].is_some() {
                return Err(PredictionError::invalid_input(format!(
                    "duplicate block number {}",
                    number
                )));
            }
            snapshot.slots[number - 1] = Some(block);
        }
        Ok(snapshot)
    }

    pub fn get(&self, number: usize) -> Option<&Block> {
        number
            .checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
            .and_then(|slot| slot.as_ref())
    }

    /// Present blocks in ascending block order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.blocks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Blocks 1-5 that are present.
    pub fn analysis_window(&self) -> Vec<&Block> {
        self.slots[..ANALYSIS_BLOCKS].iter().flatten().collect()
    }

    /// Blocks 6-7 that are present.
    pub fn verification_window(&self) -> Vec<&Block> {
        self.slots[ANALYSIS_BLOCKS..].iter().flatten().collect()
    }

    /// True when every block 1-5 has data.
    pub fn has_full_analysis_window(&self) -> bool {
        self.slots[..ANALYSIS_BLOCKS].iter().all(Option::is_some)
    }
}

/// Reference pair a prediction was computed against; verification reuses it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLevels {
    pub hour_open: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyBias {
    pub direction: Direction,
    /// In volatility units, never negative.
    pub strength: f64,
}

/// Outcome of scanning blocks 3-5 for a move against the early bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterSignal {
    pub direction: Option<Direction>,
    pub trigger_block: Option<u8>,
}

impl CounterSignal {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn detected(direction: Direction, trigger_block: u8) -> Self {
        Self {
            direction: Some(direction),
            trigger_block: Some(trigger_block),
        }
    }

    pub fn has_counter(&self) -> bool {
        self.direction.is_some()
    }
}

/// Persisted hourly prediction.
///
/// `(instrument_id, hour_start)` identifies a prediction. The verification
/// fields stay `None` until the single verification write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub symbol: String,
    pub instrument_id: String,
    pub hour_start: DateTime<Utc>,
    pub prediction_timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub strength: Strength,
    pub confidence: f64,
    pub decision_tree: DecisionTree,
    pub early_bias: Direction,
    pub early_bias_strength: f64,
    /// `Some` exactly when a sustained counter was detected.
    pub counter_direction: Option<Direction>,
    pub deviation_at_5of7: f64,
    pub blocks: BlockSnapshot,
    pub reference: ReferenceLevels,
    pub created_at: DateTime<Utc>,
    pub realized_close: Option<f64>,
    pub actual_result: Option<VerificationResult>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Prediction {
    pub fn has_sustained_counter(&self) -> bool {
        self.counter_direction.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.actual_result.is_none()
    }

    pub fn hour_end(&self) -> DateTime<Utc> {
        self.hour_start + Duration::milliseconds(HOUR_MS)
    }
}
