//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignStatus, MessageReport, RecipientOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use wapulse_common::types::{AudienceId, CampaignId, MediaId, TemplateId};
use wapulse_common::{Error, Result};

/// Campaign persistence.
///
/// `save` overwrites the whole record (last writer wins); there is no
/// optimistic concurrency check.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn save(&self, campaign: &Campaign) -> Result<()>;
    async fn list_by_status(&self, statuses: &[CampaignStatus]) -> Result<Vec<Campaign>>;
    /// Scheduled campaigns whose `scheduled_for` is at or before `now`
    async fn list_scheduled_ready(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;
}

#[derive(FromRow)]
struct CampaignRow {
    id: CampaignId,
    owner_id: String,
    name: String,
    status: String,
    audience_id: AudienceId,
    template_id: TemplateId,
    variable_bindings: Json<BTreeMap<String, String>>,
    media_id: Option<MediaId>,
    sent_count: i32,
    failed_count: i32,
    contact_count: i32,
    reports: Json<Vec<MessageReport>>,
    recipient_outcomes: Json<Vec<RecipientOutcome>>,
    scheduled_for: Option<DateTime<Utc>>,
    last_dispatched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = Error;

    fn try_from(row: CampaignRow) -> Result<Self> {
        let status = row.status.parse().map_err(Error::Database)?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            status,
            audience_id: row.audience_id,
            template_id: row.template_id,
            variable_bindings: row.variable_bindings.0,
            media_id: row.media_id,
            sent_count: row.sent_count,
            failed_count: row.failed_count,
            contact_count: row.contact_count,
            reports: row.reports.0,
            recipient_outcomes: row.recipient_outcomes.0,
            scheduled_for: row.scheduled_for,
            last_dispatched_at: row.last_dispatched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_campaigns(rows: Vec<CampaignRow>) -> Result<Vec<Campaign>> {
    rows.into_iter().map(Campaign::try_from).collect()
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for DbCampaignRepository {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .map(Campaign::try_from)
            .transpose()
    }

    async fn save(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, owner_id, name, status, audience_id, template_id, variable_bindings,
                media_id, sent_count, failed_count, contact_count, reports,
                recipient_outcomes, scheduled_for, last_dispatched_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                audience_id = EXCLUDED.audience_id,
                template_id = EXCLUDED.template_id,
                variable_bindings = EXCLUDED.variable_bindings,
                media_id = EXCLUDED.media_id,
                sent_count = EXCLUDED.sent_count,
                failed_count = EXCLUDED.failed_count,
                contact_count = EXCLUDED.contact_count,
                reports = EXCLUDED.reports,
                recipient_outcomes = EXCLUDED.recipient_outcomes,
                scheduled_for = EXCLUDED.scheduled_for,
                last_dispatched_at = EXCLUDED.last_dispatched_at,
                updated_at = NOW()
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.owner_id)
        .bind(&campaign.name)
        .bind(campaign.status.to_string())
        .bind(campaign.audience_id)
        .bind(campaign.template_id)
        .bind(Json(&campaign.variable_bindings))
        .bind(campaign.media_id)
        .bind(campaign.sent_count)
        .bind(campaign.failed_count)
        .bind(campaign.contact_count)
        .bind(Json(&campaign.reports))
        .bind(Json(&campaign.recipient_outcomes))
        .bind(campaign.scheduled_for)
        .bind(campaign.last_dispatched_at)
        .bind(campaign.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_by_status(&self, statuses: &[CampaignStatus]) -> Result<Vec<Campaign>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE status = ANY($1) ORDER BY created_at ASC",
        )
        .bind(&statuses)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        into_campaigns(rows)
    }

    async fn list_scheduled_ready(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'scheduled'
              AND scheduled_for IS NOT NULL
              AND scheduled_for <= $1
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        into_campaigns(rows)
    }
}
