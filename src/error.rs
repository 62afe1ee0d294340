//! Error types for the research pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur inside the research pipeline.
///
/// Only [`Error::InvalidInput`] ever escapes [`crate::ResearchAgent::run`];
/// every other variant is folded into a degraded report by the orchestrator.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied an unusable batch
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Backend answered, but not in the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Backend answer exceeded the configured size bound
    #[error("Response too large: {size} chars (limit {limit})")]
    ResponseTooLarge { size: usize, limit: usize },

    /// An operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Synthesis output failed schema validation
    #[error("Schema validation failed: {0}")]
    Schema(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for research pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
