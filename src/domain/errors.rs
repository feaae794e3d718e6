use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while generating or verifying an hourly prediction.
///
/// Only `TransientIo` is worth retrying; every other variant means "no result
/// for this hour" and is reported, not escalated.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Instrument not found for symbol: {symbol}")]
    IdentityNotFound { symbol: String },

    #[error("No data available for {instrument_id}: {reason}")]
    DataUnavailable {
        instrument_id: String,
        reason: String,
    },

    #[error("Hour {hour_start} is not ready for verification until {ready_at}")]
    NotReadyYet {
        hour_start: DateTime<Utc>,
        ready_at: DateTime<Utc>,
    },

    #[error("Prediction already exists for {instrument_id} at {hour_start}")]
    DuplicateRecord {
        instrument_id: String,
        hour_start: DateTime<Utc>,
    },

    #[error("Transient I/O failure: {0:#}")]
    TransientIo(anyhow::Error),
}

impl PredictionError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        PredictionError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn data_unavailable(instrument_id: &str, reason: impl Into<String>) -> Self {
        PredictionError::DataUnavailable {
            instrument_id: instrument_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether a retry of the whole job body may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, PredictionError::TransientIo(_))
    }
}
