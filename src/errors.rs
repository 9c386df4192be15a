//! Error types for the sync engine and its CLI

use thiserror::Error;

/// Main error type threaded through the sync core, its collaborators, and the CLI.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Connection failure, timeout, or non-2xx response. Carries the status
    /// code (when one was received) and the response body.
    #[error("transport error: {status} {body}")]
    Transport { status: String, body: String },

    /// 404 on update/delete — for fetch, "not found" is a legitimate `None`
    /// and never reaches this variant.
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Name resolution matched more than one workflow.
    #[error("ambiguous name {query:?}: {} candidates", candidates.len())]
    Ambiguous { query: String, candidates: Vec<String> },

    /// A remote workflow under monitoring returned 404 on a poll fetch.
    /// The SyncState is left in place (see §9 open questions) until the
    /// caller unregisters it.
    #[error("remote workflow {0} was deleted while monitored")]
    RemoteWorkflowDeleted(String),

    #[error("workflow body must be a JSON object: {0}")]
    ValidationError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Internal(err.to_string())
    }
}
