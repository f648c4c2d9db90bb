//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use wapulse_core::CampaignError;

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error, rendered from the shared error's status and code
#[derive(Debug)]
pub struct ApiError(pub wapulse_common::Error);

impl From<wapulse_common::Error> for ApiError {
    fn from(err: wapulse_common::Error) -> Self {
        Self(err)
    }
}

impl From<CampaignError> for ApiError {
    fn from(err: CampaignError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.code().to_ascii_lowercase(),
                message,
            }),
        )
            .into_response()
    }
}
