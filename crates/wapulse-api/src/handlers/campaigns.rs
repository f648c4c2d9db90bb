//! Campaign handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use wapulse_core::{CampaignView, DeliveryMetrics, DispatchSummary, PollOutcome, RetrySummary};

use crate::error::ApiError;
use crate::state::AppState;

/// Response to an accepted "send now" request
#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchAccepted {
    pub campaign_id: Uuid,
    pub status: String,
}

/// Request body for scheduling a campaign
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_for: DateTime<Utc>,
}

/// Response to a manual report refresh
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// False when the campaign expects no reports yet
    pub polled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PollOutcome>,
}

/// Get a campaign with its display status
///
/// GET /api/v1/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignView>, ApiError> {
    Ok(Json(state.controller.view(id).await?))
}

/// Send a campaign now. The send loop runs in the background.
///
/// POST /api/v1/campaigns/:id/dispatch
pub async fn dispatch_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<DispatchAccepted>), ApiError> {
    state.controller.start_dispatch(&state.context, id).await?;
    info!(campaign_id = %id, "Campaign dispatch accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchAccepted {
            campaign_id: id,
            status: "sending".to_string(),
        }),
    ))
}

/// Schedule a draft campaign
///
/// POST /api/v1/campaigns/:id/schedule
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScheduleRequest>,
) -> Result<Json<CampaignView>, ApiError> {
    state.controller.schedule(id, input.scheduled_for).await?;
    Ok(Json(state.controller.view(id).await?))
}

/// Resend to recipients whose last attempt failed
///
/// POST /api/v1/campaigns/:id/retry-failed
pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RetrySummary>, ApiError> {
    Ok(Json(state.controller.retry_failed(&state.context, id).await?))
}

/// Resend to the whole audience
///
/// POST /api/v1/campaigns/:id/resend
pub async fn resend_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchSummary>, ApiError> {
    Ok(Json(state.controller.resend(&state.context, id).await?))
}

/// Poll delivery reports for the current day
///
/// POST /api/v1/campaigns/:id/reports/refresh
pub async fn refresh_reports(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let outcome = state.controller.refresh_reports(&state.context, id).await?;
    Ok(Json(RefreshResponse {
        polled: outcome.is_some(),
        outcome,
    }))
}

/// Delivery metrics derived from the campaign's reports
///
/// GET /api/v1/campaigns/:id/metrics
pub async fn campaign_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryMetrics>, ApiError> {
    Ok(Json(state.controller.metrics(id).await?))
}
