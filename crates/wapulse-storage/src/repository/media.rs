//! Media repository

use crate::db::DatabasePool;
use async_trait::async_trait;
use wapulse_common::types::MediaId;
use wapulse_common::{Error, Result};

/// Resolves uploaded media to the identifier the provider knows it by
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn get_media(&self, id: MediaId) -> Result<Option<String>>;
}

/// Database media repository
pub struct DbMediaRepository {
    pool: DatabasePool,
}

impl DbMediaRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStore for DbMediaRepository {
    async fn get_media(&self, id: MediaId) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT provider_media_id FROM media WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(|(media_id,)| media_id))
    }
}
