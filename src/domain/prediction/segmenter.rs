//! Splits one hour of bars into seven equal blocks.
//!
//! Block `k` covers `[hour_start + (k-1)·H/7, hour_start + k·H/7)` with
//! integer millisecond boundaries. Adjacent blocks share a boundary computed
//! by the same expression, so the blocks tile the hour exactly and block 7
//! ends on `hour_start + 1h`.

use crate::domain::errors::PredictionError;
use crate::domain::market::bar::Bar;
use crate::domain::prediction::types::{
    BLOCK_COUNT, Block, BlockSnapshot, HOUR_MS, ReferenceLevels,
};
use chrono::{DateTime, Duration, Utc};

/// Offset of the k-th block boundary (0..=7) from the start of the hour.
fn boundary_offset_ms(k: usize) -> i64 {
    (k as i64 * HOUR_MS) / BLOCK_COUNT as i64
}

/// `[start, end)` of block `number` (1..=7).
pub fn block_bounds(hour_start: DateTime<Utc>, number: usize) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = hour_start + Duration::milliseconds(boundary_offset_ms(number - 1));
    let end = hour_start + Duration::milliseconds(boundary_offset_ms(number));
    (start, end)
}

/// The 5/7 point of the hour (end of block 5), when predictions are made.
pub fn prediction_point(hour_start: DateTime<Utc>) -> DateTime<Utc> {
    hour_start + prediction_offset()
}

pub fn prediction_offset() -> Duration {
    Duration::milliseconds(boundary_offset_ms(5))
}

/// One segmented hour: its reference levels and block snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedHour {
    pub hour_start: DateTime<Utc>,
    pub reference: ReferenceLevels,
    pub blocks: BlockSnapshot,
}

impl SegmentedHour {
    pub fn analysis_window(&self) -> Vec<&Block> {
        self.blocks.analysis_window()
    }

    pub fn verification_window(&self) -> Vec<&Block> {
        self.blocks.verification_window()
    }

    pub fn prediction_point(&self) -> DateTime<Utc> {
        prediction_point(self.hour_start)
    }
}

pub struct BlockSegmenter;

impl BlockSegmenter {
    /// Segments `bars` (a superset of the hour is fine) into blocks.
    ///
    /// Bars outside the hour are ignored. Blocks with no bars are omitted
    /// from the snapshot.
    pub fn segment(
        bars: &[Bar],
        hour_start: DateTime<Utc>,
        volatility: f64,
    ) -> Result<SegmentedHour, PredictionError> {
        if bars.is_empty() {
            return Err(PredictionError::invalid_input("no bars to segment"));
        }
        if !volatility.is_finite() || volatility <= 0.0 {
            return Err(PredictionError::invalid_input(format!(
                "volatility must be positive, got {}",
                volatility
            )));
        }

        let hour_start_ms = hour_start.timestamp_millis();
        let hour_end_ms = hour_start_ms + HOUR_MS;

        let mut in_hour: Vec<&Bar> = bars
            .iter()
            .filter(|bar| bar.timestamp >= hour_start_ms && bar.timestamp < hour_end_ms)
            .collect();
        in_hour.sort_by_key(|bar| bar.timestamp);

        let hour_open = match in_hour.first() {
            Some(first) => first.open_f64(),
            None => {
                return Err(PredictionError::invalid_input(format!(
                    "none of {} bars fall inside the hour starting {}",
                    bars.len(),
                    hour_start
                )));
            }
        };

        let mut blocks = Vec::with_capacity(BLOCK_COUNT);
        for number in 1..=BLOCK_COUNT {
            let start_ms = hour_start_ms + boundary_offset_ms(number - 1);
            let end_ms = hour_start_ms + boundary_offset_ms(number);

            let members: Vec<&Bar> = in_hour
                .iter()
                .copied()
                .filter(|bar| bar.timestamp >= start_ms && bar.timestamp < end_ms)
                .collect();

            if members.is_empty() {
                continue;
            }

            let (start_time, end_time) = block_bounds(hour_start, number);
            blocks.push(Self::build_block(
                number as u8,
                start_time,
                end_time,
                &members,
                hour_open,
                volatility,
            )?);
        }

        Ok(SegmentedHour {
            hour_start,
            reference: ReferenceLevels {
                hour_open,
                volatility,
            },
            blocks: BlockSnapshot::from_blocks(blocks)?,
        })
    }

    fn build_block(
        number: u8,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        members: &[&Bar],
        hour_open: f64,
        volatility: f64,
    ) -> Result<Block, PredictionError> {
        let open = members[0].open_f64();
        let close = members[members.len() - 1].close_f64();
        if close <= 0.0 {
            return Err(PredictionError::invalid_input(format!(
                "block {} has non-positive close {}",
                number, close
            )));
        }

        let high = members
            .iter()
            .map(|bar| bar.high_f64())
            .fold(f64::MIN, f64::max);
        let low = members
            .iter()
            .map(|bar| bar.low_f64())
            .fold(f64::MAX, f64::min);
        let volume = members.iter().map(|bar| bar.volume_f64()).sum();

        let count = members.len() as f64;
        let above = members
            .iter()
            .filter(|bar| bar.close_f64() > hour_open)
            .count() as f64;
        let below = members
            .iter()
            .filter(|bar| bar.close_f64() < hour_open)
            .count() as f64;

        Ok(Block {
            number,
            start_time,
            end_time,
            open,
            high,
            low,
            close,
            volume,
            deviation_from_open: (close - hour_open) / volatility,
            crosses_open: low <= hour_open && hour_open <= high,
            time_above_open: above / count,
            time_below_open: below / count,
            bar_count: members.len(),
        })
    }
}
