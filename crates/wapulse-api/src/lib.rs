//! WaPulse API - REST API server
//!
//! Exposes campaign lifecycle operations, delivery metrics and the
//! Prometheus scrape endpoint.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::{cors_layer, create_router};
pub use state::AppState;
