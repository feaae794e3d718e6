use crate::domain::prediction::types::{Prediction, VerificationResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Hit counts for one slice of verified predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AccuracyBucket {
    pub total: usize,
    pub correct: usize,
}

impl AccuracyBucket {
    fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    /// Hit rate in percent, `None` when empty.
    pub fn accuracy_pct(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.correct as f64 / self.total as f64 * 100.0)
        }
    }
}

/// Historical accuracy of verified predictions.
///
/// Pending predictions are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccuracyStats {
    pub overall: AccuracyBucket,
    pub by_direction: BTreeMap<String, AccuracyBucket>,
    pub by_strength: BTreeMap<String, AccuracyBucket>,
    pub by_tree: BTreeMap<String, AccuracyBucket>,
    pub average_confidence: Option<f64>,
}

impl AccuracyStats {
    pub fn from_predictions(predictions: &[Prediction]) -> Self {
        let mut stats = Self::default();
        let mut confidence_sum = 0.0;

        for prediction in predictions {
            let Some(result) = prediction.actual_result else {
                continue;
            };
            let correct = result == VerificationResult::Correct;

            stats.overall.record(correct);
            stats
                .by_direction
                .entry(prediction.direction.to_string())
                .or_default()
                .record(correct);
            stats
                .by_strength
                .entry(prediction.strength.to_string())
                .or_default()
                .record(correct);
            stats
                .by_tree
                .entry(prediction.decision_tree.to_string())
                .or_default()
                .record(correct);
            confidence_sum += prediction.confidence;
        }

        if stats.overall.total > 0 {
            stats.average_confidence = Some(confidence_sum / stats.overall.total as f64);
        }
        stats
    }

    pub fn accuracy_pct(&self) -> Option<f64> {
        self.overall.accuracy_pct()
    }
}
