//! Data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wapulse_common::types::{AudienceId, CampaignId, ContactId, MediaId, TemplateId};

// ============================================================================
// Campaigns
// ============================================================================

/// Stored campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
}

impl CampaignStatus {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Scheduled, Sending)
                | (Sending, Sent)
                | (Sent, Sending)
                // stuck recovery restarts a run that never finished
                | (Sending, Sending)
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Sent => write!(f, "sent"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Status shown to users, derived from the stored status and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

impl From<CampaignStatus> for DisplayStatus {
    fn from(status: CampaignStatus) -> Self {
        match status {
            CampaignStatus::Draft => DisplayStatus::Draft,
            CampaignStatus::Scheduled => DisplayStatus::Scheduled,
            CampaignStatus::Sending => DisplayStatus::Sending,
            CampaignStatus::Sent => DisplayStatus::Sent,
        }
    }
}

/// Last send outcome for one contact of a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    pub contact_id: ContactId,
    pub phone: String,
    pub succeeded: bool,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Campaign model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub owner_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub audience_id: AudienceId,
    pub template_id: TemplateId,
    /// Template variable name -> contact field path
    pub variable_bindings: BTreeMap<String, String>,
    pub media_id: Option<MediaId>,
    pub sent_count: i32,
    pub failed_count: i32,
    pub contact_count: i32,
    /// Unique by `message_id`, newest submission first
    pub reports: Vec<MessageReport>,
    pub recipient_outcomes: Vec<RecipientOutcome>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub last_dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a draft campaign
    pub fn new_draft(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        audience_id: AudienceId,
        template_id: TemplateId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            status: CampaignStatus::Draft,
            audience_id,
            template_id,
            variable_bindings: BTreeMap::new(),
            media_id: None,
            sent_count: 0,
            failed_count: 0,
            contact_count: 0,
            reports: Vec::new(),
            recipient_outcomes: Vec::new(),
            scheduled_for: None,
            last_dispatched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status shown to users: a sent campaign with failures reads as failed
    pub fn display_status(&self) -> DisplayStatus {
        if self.status == CampaignStatus::Sent && self.failed_count > 0 {
            DisplayStatus::Failed
        } else {
            self.status.into()
        }
    }

    /// Number of report records the campaign should account for
    pub fn expected_report_count(&self) -> usize {
        let expected = if self.sent_count > 0 {
            self.sent_count
        } else {
            self.contact_count
        };
        expected.max(0) as usize
    }

    /// Contacts whose last recorded send failed
    pub fn failed_contact_ids(&self) -> Vec<ContactId> {
        self.recipient_outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.contact_id)
            .collect()
    }

    /// Record fresh outcomes, replacing earlier ones for the same contacts
    pub fn record_outcomes(&mut self, outcomes: &[RecipientOutcome]) {
        for outcome in outcomes {
            match self
                .recipient_outcomes
                .iter_mut()
                .find(|o| o.contact_id == outcome.contact_id)
            {
                Some(existing) => *existing = outcome.clone(),
                None => self.recipient_outcomes.push(outcome.clone()),
            }
        }
    }

    /// Whether the campaign still has no delivery reports after sending
    pub fn awaiting_reports(&self) -> bool {
        matches!(self.status, CampaignStatus::Sending | CampaignStatus::Sent)
            && self.sent_count > 0
            && self.reports.is_empty()
    }
}

// ============================================================================
// Delivery reports
// ============================================================================

/// Delivery status reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "PENDING"),
            ReportStatus::Sent => write!(f, "SENT"),
            ReportStatus::Delivered => write!(f, "DELIVERED"),
            ReportStatus::Read => write!(f, "READ"),
            ReportStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReportStatus::Pending),
            "SENT" => Ok(ReportStatus::Sent),
            "DELIVERED" => Ok(ReportStatus::Delivered),
            "READ" => Ok(ReportStatus::Read),
            "FAILED" => Ok(ReportStatus::Failed),
            _ => Err(format!("Invalid report status: {}", s)),
        }
    }
}

/// One provider delivery report, keyed by the provider's message id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReport {
    pub message_id: String,
    pub recipient: String,
    pub status: ReportStatus,
    pub submitted_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub message_type: String,
    pub error_code: Option<String>,
}

impl MessageReport {
    /// Status to display: a read timestamp always wins over the stored status
    pub fn effective_status(&self) -> ReportStatus {
        if self.read_at.is_some() {
            ReportStatus::Read
        } else {
            self.status
        }
    }
}

// ============================================================================
// Audience, templates, media
// ============================================================================

/// Contact model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub audience_id: AudienceId,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub custom_fields: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Create a contact with no optional fields
    pub fn new(audience_id: AudienceId, phone: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            audience_id,
            phone: phone.into(),
            name: None,
            email: None,
            custom_fields: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    /// Resolve a field path (`phone`, `name`, `email`, `custom.<key>` or a bare
    /// custom field key) to its string value
    pub fn field(&self, path: &str) -> Option<String> {
        match path {
            "phone" => Some(self.phone.clone()),
            "name" => self.name.clone(),
            "email" => self.email.clone(),
            other => {
                let key = other.strip_prefix("custom.").unwrap_or(other);
                self.custom_fields.get(key).and_then(json_scalar)
            }
        }
    }
}

fn json_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Message template model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub language: String,
    pub header: Option<String>,
    pub body: String,
    pub footer: Option<String>,
}

/// Uploaded media model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    /// Identifier assigned by the provider on upload
    pub provider_media_id: String,
    pub mime_type: String,
}
