//! Error taxonomy for the RAG pipeline.
//!
//! Errors fall into two channels:
//!
//! - **Startup errors** stop the process before it serves any request. Those
//!   that need operator action ([`RagError::Configuration`], a missing
//!   corpus with no index to fall back on) are fatal; a provider failure
//!   during the first index build is transient and reported as such. See
//!   [`RagError::is_fatal`].
//! - **Per-request errors** ([`RagError::Retrieval`], [`RagError::Embedding`],
//!   [`RagError::Generation`], [`RagError::Timeout`]) are contained by
//!   [`RagService::answer`](crate::service::RagService::answer) and turned
//!   into the fallback response.
//!
//! History corruption never surfaces as an error value to callers; the
//! [`RagError::HistoryCorrupt`] variant exists so the history loader can log
//! a typed cause before recovering with an empty history.

use std::path::PathBuf;
use std::time::Duration;

/// Convenience alias used throughout the library.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Invalid or incomplete configuration (bad chunk parameters, unknown
    /// provider, missing credentials).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No persisted vector index exists at the given location.
    #[error("vector index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    /// A persisted vector index exists but cannot be read back.
    #[error("vector index at {} is corrupt: {reason}", .path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    /// The history file exists but does not contain a valid turn list.
    #[error("history file {} is corrupt: {reason}", .path.display())]
    HistoryCorrupt { path: PathBuf, reason: String },

    /// Reading or writing a local file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The corpus directory is missing or yields no documents.
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Vector index storage failed while building or querying.
    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    /// A remote call exceeded its configured deadline.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl RagError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that need operator action before a restart can succeed.
    ///
    /// Index errors are not fatal on their own since startup answers them
    /// with a rebuild. Provider errors are transient: a retry may succeed
    /// once the provider is reachable again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Corpus(_) | Self::Io { .. } | Self::Storage(_)
        )
    }

    /// True for index errors that the startup path answers with a rebuild.
    pub fn is_index_missing_or_corrupt(&self) -> bool {
        matches!(self, Self::IndexNotFound(_) | Self::IndexCorrupt { .. })
    }
}
