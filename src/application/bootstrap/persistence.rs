use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::repositories::PredictionRepository;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::SqlitePredictionRepository;

pub struct PersistenceHandle {
    pub db: Database,
    pub prediction_repository: Arc<dyn PredictionRepository>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(database_url: &str) -> Result<PersistenceHandle> {
        info!("Initializing Database at {}", database_url);

        let db = Database::new(database_url)
            .await
            .context("Failed to initialize database")?;
        let prediction_repository = Arc::new(SqlitePredictionRepository::new(db.pool.clone()));

        Ok(PersistenceHandle {
            db,
            prediction_repository,
        })
    }
}
