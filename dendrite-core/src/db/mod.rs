//! Database layer for dendrite
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for thread/message/tool-call queries
//! - FTS5-backed ranked search

pub mod repo;
pub mod schema;
pub mod search;

pub use repo::Database;
