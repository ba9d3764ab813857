//! # dendrite-core
//!
//! Core library for dendrite - the tool-call orchestration and
//! human-in-the-loop validation layer of an assistant chat backend.
//!
//! This library provides:
//! - The tool-call lifecycle state machine with its human approval gate
//! - Thread/message storage with cursor-based backward pagination
//! - Ranked full-text search over conversation content
//! - Tool execution adapters behind a discovery registry
//!
//! ## Architecture
//!
//! A `ChatService` fronts everything: it enforces thread ownership,
//! appends immutable messages, and drives tool calls through the
//! `Orchestrator`. Calls to gated tools park in `pending_approval`
//! until the thread owner accepts or rejects them; every transition is
//! a guarded SQL update, so concurrent decisions resolve to exactly one
//! winner and the rest see a conflict.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dendrite_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use orchestrator::{DecisionOutcome, Orchestrator, ProposedCall};
pub use service::{ChatService, TitleGenerator};
pub use tools::{ExecutionContext, Tool, ToolRegistry};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod paging;
pub mod service;
pub mod tools;
pub mod types;
