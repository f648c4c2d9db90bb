//! WaPulse Common - Shared types and configuration
//!
//! This crate provides the configuration, error type, identifiers and the
//! explicit session context shared across all WaPulse components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::SessionContext;
