//! InviteQ API - REST API server
//!
//! Exposes campaign management, sending account administration,
//! acceptance event ingestion, and reporting over HTTP.

pub mod handlers;
pub mod routes;

pub use routes::{create_router, AppState};
