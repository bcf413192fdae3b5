//! Error taxonomy for the engine.
//!
//! Two failure modes never reach this enum: embedding-provider failures are
//! degraded in place to zero vectors, and duplicate-id conflicts are
//! recovered by a single upsert retry inside the write path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// File or URL could not be reached.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Unrecognized extension or unparseable structured document.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Zero incidents parsed, or an empty collection queried.
    #[error("no incidents found: {0}")]
    NoData(String),

    /// Underlying vector store error, surfaced as a result, never a crash.
    #[error("vector store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Error-chain detail included as the `traceback` field of envelopes.
    pub fn traceback(&self) -> String {
        match self {
            EngineError::Other(e) => format!("{:#}", e),
            other => other.to_string(),
        }
    }
}
