//! Campaign engine
//!
//! Provides:
//! - Paced per-recipient dispatch with outcome tracking
//! - Template rendering against contact fields
//! - Delivery-report polling and idempotent reconciliation
//! - Lifecycle operations (send now, schedule, retry, resend, refresh)
//! - The background scheduler for sweeps and report monitoring

mod controller;
mod dispatcher;
mod error;
mod merger;
mod poller;
mod scheduler;
mod stats;
mod template;

pub use controller::{CampaignController, CampaignStores, CampaignView, RetrySummary};
pub use dispatcher::{DispatchSummary, MessageDispatcher};
pub use error::CampaignError;
pub use merger::{merge_reports, MergeOutcome};
pub use poller::{select_closest, DeliveryReportPoller, PollOutcome, ReportWindow};
pub use scheduler::CampaignScheduler;
pub use stats::DeliveryMetrics;
pub use template::{RenderedMessage, TemplateRenderer};
