//! Shared handler state

use std::sync::Arc;
use wapulse_common::SessionContext;
use wapulse_core::{CampaignController, EngineMetrics};
use wapulse_storage::DatabasePool;

/// Application state shared by every handler
pub struct AppState {
    pub controller: CampaignController,
    /// Provider session used for operations triggered over HTTP
    pub context: SessionContext,
    pub metrics: Arc<EngineMetrics>,
    /// Absent when running on the in-memory backend
    pub db_pool: Option<DatabasePool>,
}
