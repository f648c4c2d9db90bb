//! Contact repository

use crate::db::DatabasePool;
use crate::models::Contact;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use wapulse_common::types::{AudienceId, ContactId};
use wapulse_common::{Error, Result};

/// Read access to campaign audiences
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Contacts of an audience, in a stable retrieval order
    async fn list_contacts(&self, audience_id: AudienceId) -> Result<Vec<Contact>>;
}

#[derive(FromRow)]
struct ContactRow {
    id: ContactId,
    audience_id: AudienceId,
    phone: String,
    name: Option<String>,
    email: Option<String>,
    custom_fields: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            audience_id: row.audience_id,
            phone: row.phone,
            name: row.name,
            email: row.email,
            custom_fields: row.custom_fields,
            created_at: row.created_at,
        }
    }
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for DbContactRepository {
    async fn list_contacts(&self, audience_id: AudienceId) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT * FROM contacts WHERE audience_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(audience_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }
}
