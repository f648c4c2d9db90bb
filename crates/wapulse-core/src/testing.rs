//! Test doubles shared by the engine's unit tests

use crate::metrics::EngineMetrics;
use crate::whatsapp::{
    MessageSender, ReportFeed, ReportPage, ReportQuery, ReportRecord, SendRequest, SendResponse,
    WhatsAppError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use wapulse_common::types::{AudienceId, CampaignId};
use wapulse_common::{Error, Result, SessionContext};
use wapulse_storage::models::{Campaign, CampaignStatus, Contact, Template};
use wapulse_storage::repository::CampaignStore;
use wapulse_storage::MemoryStore;

pub fn context() -> SessionContext {
    SessionContext::new("acct-test", "token-test")
}

pub fn metrics() -> Arc<EngineMetrics> {
    Arc::new(EngineMetrics::new().unwrap())
}

/// Sender that records requests and fails for configured phones
#[derive(Default)]
pub struct FakeSender {
    requests: Mutex<Vec<(Instant, SendRequest)>>,
    rejected: Mutex<HashSet<String>>,
    erroring: Mutex<HashSet<String>>,
}

impl FakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provider answers `success: false` for these phones
    pub fn reject(&self, phones: &[&str]) {
        *self.rejected.lock().unwrap() = phones.iter().map(|p| p.to_string()).collect();
    }

    /// Transport error for these phones
    pub fn error_on(&self, phones: &[&str]) {
        *self.erroring.lock().unwrap() = phones.iter().map(|p| p.to_string()).collect();
    }

    pub fn clear_failures(&self) {
        self.rejected.lock().unwrap().clear();
        self.erroring.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<SendRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.recipient).collect()
    }

    pub fn send_instants(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl MessageSender for FakeSender {
    async fn send(
        &self,
        _context: &SessionContext,
        request: &SendRequest,
    ) -> std::result::Result<SendResponse, WhatsAppError> {
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        if self.erroring.lock().unwrap().contains(&request.recipient) {
            return Err(WhatsAppError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        if self.rejected.lock().unwrap().contains(&request.recipient) {
            return Ok(SendResponse {
                success: false,
                error: Some("recipient not on WhatsApp".into()),
            });
        }
        Ok(SendResponse {
            success: true,
            error: None,
        })
    }
}

/// Feed serving queued pages, or failing when asked to
#[derive(Default)]
pub struct FakeFeed {
    pages: Mutex<VecDeque<ReportPage>>,
    fail: AtomicBool,
    queries: Mutex<Vec<ReportQuery>>,
}

impl FakeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, records: Vec<ReportRecord>, next_cursor: Option<&str>) {
        self.pages.lock().unwrap().push_back(ReportPage {
            total: Some(records.len() as u64),
            records,
            next_cursor: next_cursor.map(str::to_string),
        });
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<ReportQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportFeed for FakeFeed {
    async fn fetch_reports(
        &self,
        _context: &SessionContext,
        query: &ReportQuery,
    ) -> std::result::Result<ReportPage, WhatsAppError> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Malformed("truncated JSON".into()));
        }
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Campaign store whose writes can be made to fail
pub struct FlakyCampaignStore {
    pub inner: MemoryStore,
    fail_saves: AtomicBool,
}

impl FlakyCampaignStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_saves: AtomicBool::new(false),
        })
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CampaignStore for FlakyCampaignStore {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        self.inner.get(id).await
    }

    async fn save(&self, campaign: &Campaign) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Database("database is locked".into()));
        }
        self.inner.save(campaign).await
    }

    async fn list_by_status(&self, statuses: &[CampaignStatus]) -> Result<Vec<Campaign>> {
        self.inner.list_by_status(statuses).await
    }

    async fn list_scheduled_ready(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        self.inner.list_scheduled_ready(now).await
    }
}

pub fn template(body: &str) -> Template {
    Template {
        id: uuid::Uuid::new_v4(),
        name: "spring_promo".into(),
        language: "en".into(),
        header: None,
        body: body.into(),
        footer: None,
    }
}

pub fn contacts(audience_id: AudienceId, phones: &[&str]) -> Vec<Contact> {
    phones
        .iter()
        .enumerate()
        .map(|(i, phone)| {
            let mut contact = Contact::new(audience_id, *phone);
            contact.name = Some(format!("Contact {}", i + 1));
            contact
        })
        .collect()
}

pub fn record(msg_id: &str, submit_ms: i64, status: &str) -> ReportRecord {
    ReportRecord {
        msg_id: msg_id.into(),
        recipient: format!("+1555{}", msg_id),
        status: status.into(),
        msg_type: "template".into(),
        submit_time: submit_ms,
        delivery_time: None,
        read_time: None,
        error_code: None,
        billing_model: None,
        channel: Some("whatsapp".into()),
    }
}
