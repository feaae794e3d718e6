// Block statistics and prediction value types
pub mod types;

// Hour -> seven blocks
pub mod segmenter;

// Blocks 1-2 bias
pub mod early_bias;

// Blocks 3-5 reversal detection
pub mod counter;

// Decision trees and confidence
pub mod engine;

pub use engine::{PredictionEngine, PredictionSignal, classify_strength};
pub use segmenter::{BlockSegmenter, SegmentedHour, prediction_point};
pub use types::{
    Block, BlockSnapshot, DecisionTree, Direction, Prediction, ReferenceLevels, Strength,
    VerificationResult,
};
