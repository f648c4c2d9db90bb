//! WhatsApp Business provider interface
//!
//! Two operations are consumed from the provider: a per-recipient send and a
//! paginated delivery-report query. Report records carry no campaign id.

mod client;

pub use client::WhatsAppClient;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wapulse_common::types::CampaignId;
use wapulse_common::SessionContext;
use wapulse_storage::models::{MessageReport, ReportStatus};

/// Provider errors
#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider payload: {0}")]
    Malformed(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

/// Per-recipient send request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub recipient: String,
    pub rendered_body: String,
    pub message_type: String,
    pub template_name: String,
    pub campaign_id: CampaignId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

/// Provider answer to a send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Delivery report query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub owner_id: String,
    /// Epoch milliseconds, inclusive
    pub from_time: i64,
    /// Epoch milliseconds, exclusive
    pub to_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_filter: Option<String>,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// One page of the report feed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    #[serde(default)]
    pub records: Vec<ReportRecord>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Raw report record as sent by the provider. Times are epoch milliseconds;
/// zero or null means the event has not happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub msg_id: String,
    pub recipient: String,
    pub status: String,
    #[serde(default)]
    pub msg_type: String,
    pub submit_time: i64,
    #[serde(default)]
    pub delivery_time: Option<i64>,
    #[serde(default)]
    pub read_time: Option<i64>,
    #[serde(default)]
    pub error_code: Option<serde_json::Value>,
    #[serde(default)]
    pub billing_model: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl ReportRecord {
    /// Convert into the stored report representation
    pub fn into_report(self) -> Result<MessageReport, WhatsAppError> {
        if self.msg_id.is_empty() {
            return Err(WhatsAppError::Malformed("record without msgId".to_string()));
        }

        let status: ReportStatus = self.status.parse().map_err(WhatsAppError::Malformed)?;
        let submitted_at = millis(Some(self.submit_time)).ok_or_else(|| {
            WhatsAppError::Malformed(format!(
                "record {} has invalid submitTime {}",
                self.msg_id, self.submit_time
            ))
        })?;

        let error_code = match self.error_code {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) if s.is_empty() => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };

        Ok(MessageReport {
            message_id: self.msg_id,
            recipient: self.recipient,
            status,
            submitted_at,
            delivered_at: millis(self.delivery_time),
            read_at: millis(self.read_time),
            message_type: self.msg_type,
            error_code,
        })
    }
}

fn millis(value: Option<i64>) -> Option<DateTime<Utc>> {
    match value {
        Some(ms) if ms > 0 => Utc.timestamp_millis_opt(ms).single(),
        _ => None,
    }
}

/// Sends one rendered message
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        context: &SessionContext,
        request: &SendRequest,
    ) -> Result<SendResponse, WhatsAppError>;
}

/// Reads the provider's delivery-report feed
#[async_trait]
pub trait ReportFeed: Send + Sync {
    async fn fetch_reports(
        &self,
        context: &SessionContext,
        query: &ReportQuery,
    ) -> Result<ReportPage, WhatsAppError>;
}
