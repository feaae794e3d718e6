use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite pool with the prediction schema applied.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // One row per (instrument, hour). Timestamps are Unix milliseconds.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                instrument_id TEXT NOT NULL,
                hour_start INTEGER NOT NULL,
                prediction_timestamp INTEGER NOT NULL,
                direction TEXT NOT NULL,
                strength TEXT NOT NULL,
                confidence REAL NOT NULL,
                decision_tree TEXT NOT NULL,
                early_bias TEXT NOT NULL,
                early_bias_strength REAL NOT NULL,
                counter_direction TEXT,
                deviation_at_5of7 REAL NOT NULL,
                hour_open REAL NOT NULL,
                volatility REAL NOT NULL,
                blocks_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                realized_close REAL,
                actual_result TEXT,
                verified_at INTEGER,
                verification_attempts INTEGER NOT NULL DEFAULT 0,
                UNIQUE (instrument_id, hour_start)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create predictions table")?;

        // Migration: databases created before attempts were tracked
        let _ = sqlx::query(
            "ALTER TABLE predictions ADD COLUMN verification_attempts INTEGER NOT NULL DEFAULT 0",
        )
        .execute(&mut *conn)
        .await;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_pending
            ON predictions (actual_result, hour_start);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create pending index")?;

        info!("Database schema initialized");
        Ok(())
    }
}
