//! API routes

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use wapulse_common::config::ApiConfig;

use crate::handlers::{campaigns, health};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let state = Arc::new(state);

    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness));

    let campaign_routes = Router::new()
        .route("/:id", get(campaigns::get_campaign))
        .route("/:id/dispatch", post(campaigns::dispatch_campaign))
        .route("/:id/schedule", post(campaigns::schedule_campaign))
        .route("/:id/retry-failed", post(campaigns::retry_failed))
        .route("/:id/resend", post(campaigns::resend_campaign))
        .route("/:id/reports/refresh", post(campaigns::refresh_reports))
        .route("/:id/metrics", get(campaigns::campaign_metrics));

    let api_v1 = Router::new().nest("/campaigns", campaign_routes);

    Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", api_v1)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins)),
        )
        .with_state(state)
}

/// CORS for the configured origins; no origins means no cross-origin access
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
