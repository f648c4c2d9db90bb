//! WaPulse Core - Campaign dispatch and delivery-report reconciliation
//!
//! This crate sends rendered template messages to a campaign's audience with
//! fixed pacing, tracks per-recipient outcomes, and reconciles the provider's
//! delivery-report feed back onto campaigns.

pub mod campaign;
pub mod metrics;
pub mod whatsapp;

#[cfg(test)]
pub(crate) mod testing;

pub use campaign::{
    merge_reports, select_closest, CampaignController, CampaignError, CampaignScheduler,
    CampaignStores, CampaignView, DeliveryMetrics, DeliveryReportPoller, DispatchSummary,
    MergeOutcome, MessageDispatcher, PollOutcome, ReportWindow, RetrySummary, TemplateRenderer,
};
pub use metrics::EngineMetrics;
pub use whatsapp::{MessageSender, ReportFeed, WhatsAppClient, WhatsAppError};
