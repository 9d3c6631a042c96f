//! Retriever configuration, loadable from a TOML file.
//!
//! ```toml
//! documents_dir = "data"
//! index_path = "data/vectors.index"
//! top_k = 3
//! precision = "f32"
//!
//! [embedding]
//! model = "sentence-transformers/all-MiniLM-L6-v2"
//! revision = "main"
//! batch_size = 32
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use crate::error::{Result, RetrieverError};
use crate::storage::VectorPrecision;
use ragdesk_embed::{DEFAULT_MODEL, EmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Settings for the embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Model identifier, either a fastembed built-in or a HuggingFace repository
    pub model: String,
    /// Where downloaded models are kept; defaults to `$HOME/.ragdesk/models`
    pub cache_dir: Option<PathBuf>,
    /// HuggingFace branch, tag or commit; ignored for built-in models
    pub revision: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            revision: None,
            batch_size: 32,
        }
    }
}

/// Configuration for a [`Retriever`](crate::Retriever).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Directory scanned for `.txt` and `.pdf` documents
    pub documents_dir: PathBuf,
    /// Base path of the persisted index
    pub index_path: PathBuf,
    /// Default number of results per query
    pub top_k: usize,
    /// Precision of persisted vectors
    pub precision: VectorPrecision,
    pub embedding: EmbeddingSettings,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data"),
            index_path: PathBuf::from("data/vectors.index"),
            top_k: 3,
            precision: VectorPrecision::F32,
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl RetrieverConfig {
    /// Read and validate a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrieverError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            RetrieverError::config(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// The file's configuration if a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn with_documents_dir<P: Into<PathBuf>>(mut self, documents_dir: P) -> Self {
        self.documents_dir = documents_dir.into();
        self
    }

    pub fn with_index_path<P: Into<PathBuf>>(mut self, index_path: P) -> Self {
        self.index_path = index_path.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_precision(mut self, precision: VectorPrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.embedding.model = model.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrieverError::config("top_k must be at least 1"));
        }
        if self.embedding.batch_size == 0 {
            return Err(RetrieverError::config(
                "embedding.batch_size must be at least 1",
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(RetrieverError::config("embedding.model must not be empty"));
        }
        if self.index_path.as_os_str().is_empty() {
            return Err(RetrieverError::config("index_path must not be empty"));
        }
        Ok(())
    }

    /// Embedding model configuration derived from the `[embedding]` table.
    pub fn to_embed_config(&self) -> EmbedConfig {
        let base_path = self
            .embedding
            .cache_dir
            .clone()
            .unwrap_or_else(ragdesk_embed::config::default_model_base_path);
        let config = EmbedConfig::from_identifier(&self.embedding.model, base_path)
            .with_batch_size(self.embedding.batch_size);
        match &self.embedding.revision {
            Some(revision) => config.with_revision(revision),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RetrieverConfig::default();
        assert_eq!(config.documents_dir, PathBuf::from("data"));
        assert_eq!(config.index_path, PathBuf::from("data/vectors.index"));
        assert_eq!(config.top_k, 3);
        assert_eq!(config.precision, VectorPrecision::F32);
        assert_eq!(config.embedding.model, DEFAULT_MODEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("ragdesk.toml");
        std::fs::write(
            &path,
            r#"
top_k = 5
precision = "f16"

[embedding]
model = "BAAI/bge-small-en-v1.5"
"#,
        )
        .unwrap();

        let config = RetrieverConfig::from_file(&path).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.precision, VectorPrecision::F16);
        assert_eq!(config.embedding.model, "BAAI/bge-small-en-v1.5");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.documents_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "top_k = 0\n").unwrap();
        assert!(matches!(
            RetrieverConfig::from_file(&path),
            Err(RetrieverError::Config(_))
        ));

        std::fs::write(&path, "precision = \"f64\"\n").unwrap();
        assert!(RetrieverConfig::from_file(&path).is_err());

        assert!(RetrieverConfig::from_file(temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_overrides_and_embed_config() {
        let config = RetrieverConfig::load_or_default(None)
            .unwrap()
            .with_documents_dir("docs")
            .with_index_path("out/idx.index")
            .with_top_k(7)
            .with_model("sentence-transformers/all-MiniLM-L12-v2");

        assert_eq!(config.documents_dir, PathBuf::from("docs"));
        assert_eq!(config.top_k, 7);

        let embed = config.to_embed_config();
        assert_eq!(embed.model_name(), "sentence-transformers/all-MiniLM-L12-v2");
        assert_eq!(embed.batch_size, 32);
        assert!(embed.builtin_model().is_some());
        assert_eq!(embed.hf_revision(), "main");
    }

    #[test]
    fn test_revision_reaches_embed_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("ragdesk.toml");
        std::fs::write(
            &path,
            r#"
[embedding]
model = "acme/custom-encoder"
revision = "v2.1"
cache_dir = "models"
"#,
        )
        .unwrap();

        let config = RetrieverConfig::from_file(&path).unwrap();
        assert_eq!(config.embedding.revision.as_deref(), Some("v2.1"));

        let embed = config.to_embed_config();
        assert_eq!(embed.hf_revision(), "v2.1");
        assert!(embed.builtin_model().is_none());
        assert!(embed.model_path().starts_with("models"));
    }
}
