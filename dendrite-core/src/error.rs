//! Error types for dendrite-core

use thiserror::Error;

/// Main error type for the dendrite-core library
#[derive(Error, Debug)]
pub enum Error {
    /// No session or the session token is invalid
    #[error("authentication required: {0}")]
    Authentication(String),

    /// Valid session but insufficient scope or ownership
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Malformed input against a schema (non-UUID id, missing query param, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Decision or transition applied against a tool call no longer in the expected state
    #[error("conflict: {0}")]
    Conflict(String),

    /// The external capability (tool backend, title generator) failed or timed out
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Thread not found
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// Tool call not found
    #[error("tool call not found: {0}")]
    ToolCallNotFound(String),

    /// Tool not registered
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status code this error maps to when exposed over a web binding.
    ///
    /// The binding itself is out of scope for this crate; the mapping is kept
    /// here so every binding agrees on the taxonomy.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Authentication(_) => 401,
            Error::Authorization(_) => 403,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::ThreadNotFound(_) | Error::ToolCallNotFound(_) | Error::ToolNotFound(_) => 404,
            Error::Upstream(_) => 502,
            _ => 500,
        }
    }
}

/// Result type alias for dendrite-core
pub type Result<T> = std::result::Result<T, Error>;
