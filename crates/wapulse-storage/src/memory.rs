//! In-memory store backend, used for development and tests

use crate::models::{Campaign, CampaignStatus, Contact, Media, Template};
use crate::repository::{CampaignStore, ContactStore, MediaStore, TemplateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wapulse_common::types::{AudienceId, CampaignId, MediaId, TemplateId};
use wapulse_common::Result;

#[derive(Default)]
struct Tables {
    campaigns: HashMap<CampaignId, Campaign>,
    /// Insertion order is the audience retrieval order
    contacts: Vec<Contact>,
    templates: HashMap<TemplateId, Template>,
    media: HashMap<MediaId, Media>,
}

/// Store implementing every store trait over shared in-memory tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.tables
            .write()
            .await
            .campaigns
            .insert(campaign.id, campaign);
    }

    pub async fn insert_contact(&self, contact: Contact) {
        self.tables.write().await.contacts.push(contact);
    }

    pub async fn insert_template(&self, template: Template) {
        self.tables
            .write()
            .await
            .templates
            .insert(template.id, template);
    }

    pub async fn insert_media(&self, media: Media) {
        self.tables.write().await.media.insert(media.id, media);
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn save(&self, campaign: &Campaign) -> Result<()> {
        let mut stored = campaign.clone();
        stored.updated_at = Utc::now();
        self.tables
            .write()
            .await
            .campaigns
            .insert(stored.id, stored);
        Ok(())
    }

    async fn list_by_status(&self, statuses: &[CampaignStatus]) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut campaigns: Vec<Campaign> = tables
            .campaigns
            .values()
            .filter(|c| statuses.contains(&c.status))
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    async fn list_scheduled_ready(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut campaigns: Vec<Campaign> = tables
            .campaigns
            .values()
            .filter(|c| c.status == CampaignStatus::Scheduled)
            .filter(|c| c.scheduled_for.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.scheduled_for);
        Ok(campaigns)
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn list_contacts(&self, audience_id: AudienceId) -> Result<Vec<Contact>> {
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| c.audience_id == audience_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>> {
        Ok(self.tables.read().await.templates.get(&id).cloned())
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn get_media(&self, id: MediaId) -> Result<Option<String>> {
        Ok(self
            .tables
            .read()
            .await
            .media
            .get(&id)
            .map(|m| m.provider_media_id.clone()))
    }
}
