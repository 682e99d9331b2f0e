//! Error types for prwatch-core

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the prwatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or rate-limit failure that outlived the retry budget.
    ///
    /// The pipeline treats this as "skip the agent for this run".
    #[error("transient fetch error for {agent}: {message}")]
    TransientFetch { agent: String, message: String },

    /// Non-retryable response from the search API
    #[error("search API error for {agent}: {message}")]
    Api { agent: String, message: String },

    /// The persisted table could not be parsed
    #[error("failed to read {path}:{line}: {message}")]
    StoreRead {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The persisted table could not be written
    #[error("failed to write {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record violates the merged <= total invariant
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Template could not be rendered
    #[error("failed to render template {template}: {message}")]
    TemplateRender { template: String, message: String },

    /// Chart backend failure
    #[error("chart error: {0}")]
    Chart(String),

    /// Publisher (git) failure
    #[error("publish error: {0}")]
    Publish(String),
}

impl Error {
    /// Whether this error is isolated to one agent's fetch.
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, Error::TransientFetch { .. } | Error::Api { .. })
    }
}

/// Result type alias for prwatch-core
pub type Result<T> = std::result::Result<T, Error>;
