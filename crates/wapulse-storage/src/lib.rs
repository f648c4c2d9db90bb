//! WaPulse Storage - Campaign, contact, template and media persistence
//!
//! This crate provides the data model and store traits consumed by the
//! dispatch engine, with PostgreSQL and in-memory backends.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
