//! Error types for the embedding system

use std::path::PathBuf;

/// Result type for embedding operations.
///
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// The variants split into two families the retriever cares about:
///
/// - **Model loading**: [`EmbedError::ModelLoad`], [`EmbedError::ModelFileNotFound`]
///   and [`EmbedError::InvalidConfig`] are raised while a model is being fetched or
///   initialized and are not retried automatically.
/// - **Inference**: [`EmbedError::Embedding`] and [`EmbedError::InvalidVector`] are
///   raised for a particular input; the caller may retry.
///
/// Use [`EmbedError::is_model_load`] instead of matching on variants when only the
/// family matters.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding model could not be fetched or initialized
    #[error("Failed to load embedding model '{model}': {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error when model files are not found or invalid
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Inference failed for the given input
    #[error("Embedding generation failed: {source}")]
    Embedding {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A vector did not satisfy the dimension/normalization invariant
    #[error("Invalid embedding vector: {message}")]
    InvalidVector { message: String },

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Wrap any error raised while loading `model`.
    pub fn model_load<E>(model: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelLoad {
            model: model.into(),
            source: source.into(),
        }
    }

    /// Wrap any error raised during inference.
    pub fn embedding<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Embedding {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid vector error with a custom message.
    pub fn invalid_vector<S: Into<String>>(message: S) -> Self {
        Self::InvalidVector {
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised while the model was being loaded.
    pub fn is_model_load(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad { .. } | Self::ModelFileNotFound { .. } | Self::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = EmbedError::model_load("some/model", anyhow::anyhow!("network down"));
        assert!(err.is_model_load());
        assert!(err.to_string().contains("some/model"));

        let err = EmbedError::embedding(anyhow::anyhow!("onnx failure"));
        assert!(!err.is_model_load());

        assert!(EmbedError::invalid_config("bad").is_model_load());
        assert!(!EmbedError::invalid_vector("zero norm").is_model_load());
    }
}
