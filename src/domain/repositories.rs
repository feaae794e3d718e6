//! Repository Pattern Abstractions
//!
//! Persistence seam for hourly predictions. Business logic only sees the
//! `PredictionRepository` trait; SQLite and in-memory implementations live in
//! `infrastructure`.
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use hourcast::domain::repositories::PredictionRepository;
//! use hourcast::infrastructure::repositories::InMemoryPredictionRepository;
//!
//! # async {
//! let repo = InMemoryPredictionRepository::new();
//! let pending = repo.get_pending_verifications(Utc::now(), 50).await;
//! # };
//! ```

use crate::domain::prediction::types::{Prediction, VerificationResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of a store attempt. Duplicates are not errors at the storage layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// Stored; carries the record with its assigned id.
    Stored(Prediction),
    /// A prediction already exists for this `(instrument_id, hour_start)`.
    Duplicate,
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    /// Insert a new prediction, refusing a second one for the same hour.
    async fn store(&self, prediction: &Prediction) -> Result<StoreOutcome>;

    async fn get_by_hour(
        &self,
        instrument_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Prediction>>;

    /// Unverified predictions with `hour_start <= started_by`. Records with
    /// fewer failed verification attempts come first, then oldest hour first,
    /// so rows that keep failing never crowd out fresh ones.
    async fn get_pending_verifications(
        &self,
        started_by: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Prediction>>;

    /// Count one failed verification attempt against a pending record.
    async fn record_verification_failure(&self, id: i64) -> Result<()>;

    /// Write the verdict. Returns `false` if the record was missing or
    /// already verified, in which case nothing changes.
    async fn update_verification(
        &self,
        id: i64,
        actual_result: VerificationResult,
        realized_close: f64,
        verified_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Verified predictions with `hour_start >= since`, optionally for one
    /// instrument.
    async fn find_verified(
        &self,
        instrument_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Prediction>>;
}
