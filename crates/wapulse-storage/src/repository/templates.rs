//! Template repository

use crate::db::DatabasePool;
use crate::models::Template;
use async_trait::async_trait;
use sqlx::FromRow;
use wapulse_common::types::TemplateId;
use wapulse_common::{Error, Result};

/// Read access to message templates
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>>;
}

#[derive(FromRow)]
struct TemplateRow {
    id: TemplateId,
    name: String,
    language: String,
    header: Option<String>,
    body: String,
    footer: Option<String>,
}

/// Database template repository
pub struct DbTemplateRepository {
    pool: DatabasePool,
}

impl DbTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for DbTemplateRepository {
    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(|r| Template {
            id: r.id,
            name: r.name,
            language: r.language,
            header: r.header,
            body: r.body,
            footer: r.footer,
        }))
    }
}
