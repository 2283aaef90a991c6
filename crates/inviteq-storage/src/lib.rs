//! InviteQ Storage - Database layer
//!
//! This crate provides the PostgreSQL storage layer for InviteQ:
//! connection pooling, row models with explicit status state machines,
//! and one repository per aggregate.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
