use crate::domain::prediction::types::{
    BlockSnapshot, DecisionTree, Direction, Prediction, ReferenceLevels, Strength,
    VerificationResult,
};
use crate::domain::repositories::{PredictionRepository, StoreOutcome};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqlitePredictionRepository {
    pool: SqlitePool,
}

impl SqlitePredictionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Invalid timestamp: {}", ms))
}

#[async_trait]
impl PredictionRepository for SqlitePredictionRepository {
    async fn store(&self, prediction: &Prediction) -> Result<StoreOutcome> {
        let blocks_json =
            serde_json::to_string(&prediction.blocks).context("Failed to encode blocks")?;

        let result = sqlx::query(
            r#"
            INSERT INTO predictions (
                symbol, instrument_id, hour_start, prediction_timestamp,
                direction, strength, confidence, decision_tree,
                early_bias, early_bias_strength, counter_direction, deviation_at_5of7,
                hour_open, volatility, blocks_json, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(instrument_id, hour_start) DO NOTHING
            "#,
        )
        .bind(&prediction.symbol)
        .bind(&prediction.instrument_id)
        .bind(prediction.hour_start.timestamp_millis())
        .bind(prediction.prediction_timestamp.timestamp_millis())
        .bind(prediction.direction.to_string())
        .bind(prediction.strength.to_string())
        .bind(prediction.confidence)
        .bind(prediction.decision_tree.to_string())
        .bind(prediction.early_bias.to_string())
        .bind(prediction.early_bias_strength)
        .bind(prediction.counter_direction.map(|d| d.to_string()))
        .bind(prediction.deviation_at_5of7)
        .bind(prediction.reference.hour_open)
        .bind(prediction.reference.volatility)
        .bind(blocks_json)
        .bind(prediction.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save prediction")?;

        if result.rows_affected() == 0 {
            debug!(
                "Prediction for {} at {} already stored",
                prediction.instrument_id, prediction.hour_start
            );
            return Ok(StoreOutcome::Duplicate);
        }

        let mut stored = prediction.clone();
        stored.id = Some(result.last_insert_rowid());
        info!(
            "Persisted prediction {} for {} at {}",
            result.last_insert_rowid(),
            prediction.instrument_id,
            prediction.hour_start
        );
        Ok(StoreOutcome::Stored(stored))
    }

    async fn get_by_hour(
        &self,
        instrument_id: &str,
        hour_start: DateTime<Utc>,
    ) -> Result<Option<Prediction>> {
        let row =
            sqlx::query("SELECT * FROM predictions WHERE instrument_id = ? AND hour_start = ?")
                .bind(instrument_id)
                .bind(hour_start.timestamp_millis())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| self.map_row(&r)).transpose()
    }

    async fn get_pending_verifications(
        &self,
        started_by: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM predictions
            WHERE actual_result IS NULL AND hour_start <= ?
            ORDER BY verification_attempts ASC, hour_start ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(started_by.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        self.map_rows(rows)
    }

    async fn record_verification_failure(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE predictions
            SET verification_attempts = verification_attempts + 1
            WHERE id = ? AND actual_result IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to record verification attempt")?;
        Ok(())
    }

    async fn update_verification(
        &self,
        id: i64,
        actual_result: VerificationResult,
        realized_close: f64,
        verified_at: DateTime<Utc>,
    ) -> Result<bool> {
        // Guarded on actual_result IS NULL: the verdict is written once.
        let result = sqlx::query(
            r#"
            UPDATE predictions
            SET actual_result = ?, realized_close = ?, verified_at = ?
            WHERE id = ? AND actual_result IS NULL
            "#,
        )
        .bind(actual_result.to_string())
        .bind(realized_close)
        .bind(verified_at.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update verification")?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_verified(
        &self,
        instrument_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM predictions
            WHERE actual_result IS NOT NULL
              AND hour_start >= ?
              AND (? IS NULL OR instrument_id = ?)
            ORDER BY hour_start ASC
            "#,
        )
        .bind(since.timestamp_millis())
        .bind(instrument_id)
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;
        self.map_rows(rows)
    }
}

impl SqlitePredictionRepository {
    fn map_rows(&self, rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Prediction>> {
        rows.iter().map(|row| self.map_row(row)).collect()
    }

    fn map_row(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Prediction> {
        let blocks_json: String = row.try_get("blocks_json")?;
        let blocks: BlockSnapshot =
            serde_json::from_str(&blocks_json).context("Failed to decode blocks_json")?;

        let counter_direction = row
            .try_get::<Option<String>, _>("counter_direction")?
            .map(|s| Direction::from_str(&s))
            .transpose()?;
        let actual_result = row
            .try_get::<Option<String>, _>("actual_result")?
            .map(|s| VerificationResult::from_str(&s))
            .transpose()?;
        let verified_at = row
            .try_get::<Option<i64>, _>("verified_at")?
            .map(from_millis)
            .transpose()?;

        Ok(Prediction {
            id: Some(row.try_get("id")?),
            symbol: row.try_get("symbol")?,
            instrument_id: row.try_get("instrument_id")?,
            hour_start: from_millis(row.try_get("hour_start")?)?,
            prediction_timestamp: from_millis(row.try_get("prediction_timestamp")?)?,
            direction: Direction::from_str(row.try_get("direction")?)?,
            strength: Strength::from_str(row.try_get("strength")?)?,
            confidence: row.try_get("confidence")?,
            decision_tree: DecisionTree::from_str(row.try_get("decision_tree")?)?,
            early_bias: Direction::from_str(row.try_get("early_bias")?)?,
            early_bias_strength: row.try_get("early_bias_strength")?,
            counter_direction,
            deviation_at_5of7: row.try_get("deviation_at_5of7")?,
            blocks,
            reference: ReferenceLevels {
                hour_open: row.try_get("hour_open")?,
                volatility: row.try_get("volatility")?,
            },
            created_at: from_millis(row.try_get("created_at")?)?,
            realized_close: row.try_get("realized_close")?,
            actual_result,
            verified_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;
    use chrono::{Duration, TimeZone};

    async fn setup() -> (tempfile::TempDir, SqlitePredictionRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("predictions.db").display());
        let db = Database::new(&url).await.unwrap();
        (dir, SqlitePredictionRepository::new(db.pool))
    }

    fn prediction(instrument_id: &str, hour: u32) -> Prediction {
        let hour_start = Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap();
        Prediction {
            id: None,
            symbol: instrument_id.to_string(),
            instrument_id: instrument_id.to_string(),
            hour_start,
            prediction_timestamp: hour_start + Duration::milliseconds(2_571_428),
            direction: Direction::Down,
            strength: Strength::Strong,
            confidence: 95.0,
            decision_tree: DecisionTree::Reversal,
            early_bias: Direction::Up,
            early_bias_strength: 0.8,
            counter_direction: Some(Direction::Down),
            deviation_at_5of7: -2.3,
            blocks: BlockSnapshot::default(),
            reference: ReferenceLevels {
                hour_open: 15000.0,
                volatility: 10.0,
            },
            created_at: hour_start + Duration::minutes(43),
            realized_close: None,
            actual_result: None,
            verified_at: None,
        }
    }

    #[tokio::test]
    async fn test_store_and_reload() {
        let (_dir, repo) = setup().await;
        let original = prediction("BTC/USDT", 10);

        let StoreOutcome::Stored(stored) = repo.store(&original).await.unwrap() else {
            panic!("expected a stored prediction");
        };
        assert!(stored.id.is_some());

        let loaded = repo
            .get_by_hour("BTC/USDT", original.hour_start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_duplicate_hour_rejected() {
        let (_dir, repo) = setup().await;
        let original = prediction("BTC/USDT", 10);

        repo.store(&original).await.unwrap();
        let second = repo.store(&original).await.unwrap();
        assert_eq!(second, StoreOutcome::Duplicate);

        // Same hour, other instrument is fine
        let other = repo.store(&prediction("ETH/USDT", 10)).await.unwrap();
        assert!(matches!(other, StoreOutcome::Stored(_)));
    }

    #[tokio::test]
    async fn test_verification_written_once() {
        let (_dir, repo) = setup().await;
        let StoreOutcome::Stored(stored) = repo.store(&prediction("BTC/USDT", 10)).await.unwrap()
        else {
            panic!("expected a stored prediction");
        };
        let id = stored.id.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 11, 5, 0).unwrap();

        assert!(
            repo.update_verification(id, VerificationResult::Correct, 14970.0, at)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .update_verification(id, VerificationResult::Wrong, 15100.0, at)
                .await
                .unwrap()
        );

        let loaded = repo
            .get_by_hour("BTC/USDT", stored.hour_start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.actual_result, Some(VerificationResult::Correct));
        assert_eq!(loaded.realized_close, Some(14970.0));
        assert_eq!(loaded.verified_at, Some(at));
    }

    #[tokio::test]
    async fn test_pending_oldest_first_and_verified_filter() {
        let (_dir, repo) = setup().await;
        for hour in [12, 10, 11] {
            repo.store(&prediction("BTC/USDT", hour)).await.unwrap();
        }
        repo.store(&prediction("ETH/USDT", 9)).await.unwrap();
        let end_of_day = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();

        let pending = repo.get_pending_verifications(end_of_day, 10).await.unwrap();
        let hours: Vec<u32> = pending
            .iter()
            .map(|p| chrono::Timelike::hour(&p.hour_start))
            .collect();
        assert_eq!(hours, vec![9, 10, 11, 12]);

        let limited = repo.get_pending_verifications(end_of_day, 2).await.unwrap();
        assert_eq!(limited.len(), 2);

        // Hours starting after the cutoff are left out
        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(repo.get_pending_verifications(cutoff, 10).await.unwrap().len(), 2);

        let first = pending[1].id.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        repo.update_verification(first, VerificationResult::Wrong, 15050.0, at)
            .await
            .unwrap();

        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let verified = repo.find_verified(Some("BTC/USDT"), since).await.unwrap();
        assert_eq!(verified.len(), 1);
        assert!(repo.find_verified(Some("ETH/USDT"), since).await.unwrap().is_empty());
        assert_eq!(repo.find_verified(None, since).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_attempts_sort_behind_fresh_rows() {
        let (_dir, repo) = setup().await;
        let mut ids = Vec::new();
        for hour in [9, 10, 11] {
            let StoreOutcome::Stored(stored) = repo.store(&prediction("BTC/USDT", hour)).await.unwrap()
            else {
                panic!("expected a stored prediction");
            };
            ids.push(stored.id.unwrap());
        }
        repo.record_verification_failure(ids[0]).await.unwrap();
        repo.record_verification_failure(ids[0]).await.unwrap();
        repo.record_verification_failure(ids[1]).await.unwrap();

        let end_of_day = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        let pending = repo.get_pending_verifications(end_of_day, 10).await.unwrap();
        let order: Vec<i64> = pending.iter().map(|p| p.id.unwrap()).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
    }
}
