//! Error types for ragdesk-retriever

use crate::storage::PersistenceError;
use ragdesk_embed::EmbedError;
use std::sync::Arc;

/// Result type for retriever operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Errors surfaced by the retrieval subsystem.
///
/// Document loading never fails as a whole: missing directories and unreadable
/// files are logged and skipped, so there is no variant for them.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// The embedding model could not be initialized
    #[error("embedding model failed to load: {0}")]
    ModelLoad(#[source] EmbedError),

    /// Inference failed for a document batch or query
    #[error("embedding failed: {0}")]
    Embedding(#[source] EmbedError),

    /// Index or document artifacts could not be read or written
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A vector does not match the dimension of the index it is used with
    #[error("dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Initialization failed while this caller was waiting for it
    #[error("index initialization failed: {0}")]
    Initialization(#[source] Arc<RetrieverError>),

    /// Async task join errors
    #[error("async task failed: {0}")]
    AsyncTask(#[from] tokio::task::JoinError),
}

impl RetrieverError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if the error, or the failure it wraps, came from persistence.
    pub fn is_persistence(&self) -> bool {
        match self {
            Self::Persistence(_) => true,
            Self::Initialization(inner) => inner.is_persistence(),
            _ => false,
        }
    }
}

impl From<EmbedError> for RetrieverError {
    fn from(err: EmbedError) -> Self {
        if err.is_model_load() {
            Self::ModelLoad(err)
        } else {
            Self::Embedding(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_embed_errors_are_routed_by_family() {
        let err: RetrieverError = EmbedError::invalid_config("missing model").into();
        assert!(matches!(err, RetrieverError::ModelLoad(_)));

        let err: RetrieverError = EmbedError::invalid_vector("zero norm").into();
        assert!(matches!(err, RetrieverError::Embedding(_)));
    }

    #[test]
    fn test_persistence_seen_through_initialization() {
        let inner = RetrieverError::Persistence(PersistenceError::Corrupt {
            path: PathBuf::from("data/vectors.index"),
            reason: "bad magic".to_string(),
        });
        let err = RetrieverError::Initialization(Arc::new(inner));
        assert!(err.is_persistence());
        assert!(err.to_string().contains("bad magic"));
    }
}
