//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementation of `PredictionRepository`.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Testing**: Ideal for unit tests and mock mode
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - No persistence across multiple instances
//!
//! For durable storage use `SqlitePredictionRepository`.

use crate::domain::prediction::types::{Prediction, VerificationResult};
use crate::domain::repositories::{PredictionRepository, StoreOutcome};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Store {
    next_id: i64,
    /// Keyed by (instrument_id, hour_start) so iteration is hour-ordered per instrument.
    rows: BTreeMap<(String, DateTime<Utc>), Prediction>,
    /// Failed verification attempts by prediction id.
    attempts: HashMap<i64, u32>,
}

/// In-memory implementation of PredictionRepository
pub struct InMemoryPredictionRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryPredictionRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
        }
    }

    pub async fn count(&self) -> usize {
        self.store.read().await.rows.len()
    }
}

impl Default for InMemoryPredictionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PredictionRepository for InMemoryPredictionRepository {
    async fn store(&self, prediction: &Prediction) -> Result<StoreOutcome> {
        let mut store = self.store.write().await;
        let key = (prediction.instrument_id.clone(), prediction.hour_start);
        if store.rows.contains_key(&key) {
            return Ok(StoreOutcome::Duplicate);
        }

        store.next_id += 1;
        let mut stored = prediction.clone();
        stored.id = Some(store.next_id);
        store.rows.insert(key, stored.clone());
        Ok(StoreOutcome::Stored(stored))
    }

    async fn get_by_hour(
        &self,
        instrument_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Prediction>> {
        let store = self.store.read().await;
        Ok(store
            .rows
            .get(&(instrument_id.to_string(), hour_start))
            .cloned())
    }

    async fn get_pending_verifications(
        &self,
        started_by: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Prediction>> {
        let store = self.store.read().await;
        let attempts = |p: &Prediction| {
            p.id
                .and_then(|id| store.attempts.get(&id).copied())
                .unwrap_or(0)
        };
        let mut pending: Vec<Prediction> = store
            .rows
            .values()
            .filter(|p| p.is_pending() && p.hour_start <= started_by)
            .cloned()
            .collect();
        pending.sort_by_key(|p| (attempts(p), p.hour_start, p.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn record_verification_failure(&self, id: i64) -> Result<()> {
        let mut store = self.store.write().await;
        let pending = store
            .rows
            .values()
            .any(|p| p.id == Some(id) && p.is_pending());
        if pending {
            *store.attempts.entry(id).or_default() += 1;
        }
        Ok(())
    }

    async fn update_verification(
        &self,
        id: i64,
        actual_result: VerificationResult,
        realized_close: f64,
        verified_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut store = self.store.write().await;
        let Some(row) = store
            .rows
            .values_mut()
            .find(|p| p.id == Some(id) && p.is_pending())
        else {
            return Ok(false);
        };

        row.actual_result = Some(actual_result);
        row.realized_close = Some(realized_close);
        row.verified_at = Some(verified_at);
        Ok(true)
    }

    async fn find_verified(
        &self,
        instrument_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Prediction>> {
        let store = self.store.read().await;
        let mut verified: Vec<Prediction> = store
            .rows
            .values()
            .filter(|p| !p.is_pending() && p.hour_start >= since)
            .filter(|p| instrument_id.is_none_or(|id| p.instrument_id == id))
            .cloned()
            .collect();
        verified.sort_by_key(|p| p.hour_start);
        Ok(verified)
    }
}
