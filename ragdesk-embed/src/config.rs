//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Models that fastembed ships definitions for and can fetch on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinModel {
    AllMiniLmL6V2,
    AllMiniLmL12V2,
    BgeSmallEnV15,
    BgeBaseEnV15,
}

impl BuiltinModel {
    /// Resolve a model identifier, with or without its organisation prefix.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        let name = identifier
            .rsplit('/')
            .next()
            .unwrap_or(identifier)
            .to_ascii_lowercase();
        match name.as_str() {
            "all-minilm-l6-v2" => Some(Self::AllMiniLmL6V2),
            "all-minilm-l12-v2" => Some(Self::AllMiniLmL12V2),
            "bge-small-en-v1.5" => Some(Self::BgeSmallEnV15),
            "bge-base-en-v1.5" => Some(Self::BgeBaseEnV15),
            _ => None,
        }
    }
}

/// Tokenizer files needed to run a user-defined ONNX model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Path to the tokenizer.json file
    pub tokenizer_path: PathBuf,
    /// Path to the config.json file
    pub config_path: PathBuf,
    /// Path to the special_tokens_map.json file
    pub special_tokens_map_path: PathBuf,
    /// Path to the tokenizer_config.json file (optional, a minimal one is generated if missing)
    pub tokenizer_config_path: Option<PathBuf>,
}

impl TokenizerConfig {
    /// Standard HuggingFace file layout inside `model_dir`.
    pub fn standard<P: AsRef<Path>>(model_dir: P) -> Self {
        let model_dir = model_dir.as_ref();
        Self {
            tokenizer_path: model_dir.join("tokenizer.json"),
            config_path: model_dir.join("config.json"),
            special_tokens_map_path: model_dir.join("special_tokens_map.json"),
            tokenizer_config_path: Some(model_dir.join("tokenizer_config.json")),
        }
    }

    /// Validate that all required tokenizer files exist
    pub fn validate(&self) -> Result<()> {
        let paths_to_check = [
            ("tokenizer", &self.tokenizer_path),
            ("config", &self.config_path),
            ("special tokens map", &self.special_tokens_map_path),
        ];

        for (name, path) in &paths_to_check {
            if !path.exists() {
                tracing::error!("Missing {}: {}", name, path.display());
                return Err(EmbedError::ModelFileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if let Some(path) = &self.tokenizer_config_path {
            if !path.exists() {
                tracing::warn!(
                    "tokenizer_config.json not found at {}, will generate minimal config",
                    path.display()
                );
            }
        }

        tracing::debug!("Tokenizer validation successful");
        Ok(())
    }
}

/// Configuration for embedding models
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Directory holding downloaded model files
    #[builder(default = "default_model_base_path()")]
    pub model_base_path: PathBuf,
    /// Model identifier, e.g. "sentence-transformers/all-MiniLM-L6-v2"
    pub model_name: String,
    /// HuggingFace repository to download a user-defined ONNX model from
    #[builder(default)]
    pub hf_model_repo: Option<String>,
    /// HuggingFace model revision/branch
    #[builder(default = r#"Some("main".to_string())"#)]
    pub hf_revision: Option<String>,
    /// ONNX file path inside the repository
    #[builder(default = r#""onnx/model.onnx".to_string()"#)]
    pub onnx_file: String,
    /// Maximum number of texts sent to the model at once
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Tokenizer configuration (user-defined models only)
    pub tokenizer_config: TokenizerConfig,
}

/// `$HOME/.ragdesk/models`, or `./models` when no home directory is known.
pub fn default_model_base_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".ragdesk").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}

impl EmbedConfig {
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Configuration for a model identifier.
    ///
    /// Identifiers naming a [`BuiltinModel`] are loaded through fastembed directly;
    /// anything else is treated as a HuggingFace repository holding an ONNX export.
    pub fn from_identifier<P: AsRef<Path>>(identifier: &str, model_base_path: P) -> Self {
        let model_base_path = model_base_path.as_ref().to_path_buf();
        let model_dir = model_base_path.join(sanitize_model_dir(identifier));
        let hf_model_repo = match BuiltinModel::from_identifier(identifier) {
            Some(_) => None,
            None => Some(identifier.to_string()),
        };
        Self {
            model_base_path,
            model_name: identifier.to_string(),
            hf_model_repo,
            hf_revision: Some("main".to_string()),
            onnx_file: "onnx/model.onnx".to_string(),
            batch_size: 32,
            tokenizer_config: TokenizerConfig::standard(model_dir),
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the HuggingFace revision (builder style)
    pub fn with_revision<S: Into<String>>(self, revision: S) -> Self {
        Self {
            hf_revision: Some(revision.into()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Directory the model files live in
    pub fn model_path(&self) -> PathBuf {
        self.model_base_path.join(sanitize_model_dir(&self.model_name))
    }

    /// Local path of the ONNX model file
    pub fn onnx_model_path(&self) -> PathBuf {
        self.model_path().join(&self.onnx_file)
    }

    pub fn tokenizer_config(&self) -> &TokenizerConfig {
        &self.tokenizer_config
    }

    /// Built-in model this configuration resolves to, if any.
    pub fn builtin_model(&self) -> Option<BuiltinModel> {
        match self.hf_model_repo {
            Some(_) => None,
            None => BuiltinModel::from_identifier(&self.model_name),
        }
    }

    /// Check if this is a HuggingFace model
    pub fn is_huggingface_model(&self) -> bool {
        self.hf_model_repo.is_some()
    }

    /// Get the HuggingFace repository name
    pub fn hf_repo(&self) -> Option<&str> {
        self.hf_model_repo.as_deref()
    }

    /// Get the HuggingFace revision
    pub fn hf_revision(&self) -> &str {
        self.hf_revision.as_deref().unwrap_or("main")
    }

    /// Check settings that would otherwise fail later, at load time.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be at least 1"));
        }
        if !self.is_huggingface_model() && self.builtin_model().is_none() {
            return Err(EmbedError::invalid_config(format!(
                "'{}' is not a built-in model and no repository is configured",
                self.model_name
            )));
        }
        Ok(())
    }

    /// Validate that all model files exist (user-defined models only)
    pub fn validate_files(&self) -> Result<()> {
        let onnx_path = self.onnx_model_path();
        if !onnx_path.exists() {
            tracing::error!("Missing ONNX model: {}", onnx_path.display());
            return Err(EmbedError::ModelFileNotFound { path: onnx_path });
        }

        self.tokenizer_config.validate()?;

        tracing::debug!("Model validation successful for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::from_identifier(DEFAULT_MODEL, default_model_base_path())
    }
}

/// "org/name" → "org--name", so repositories map onto one directory level.
fn sanitize_model_dir(identifier: &str) -> String {
    identifier.replace('/', "--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_identifiers() {
        assert_eq!(
            BuiltinModel::from_identifier("sentence-transformers/all-MiniLM-L6-v2"),
            Some(BuiltinModel::AllMiniLmL6V2)
        );
        assert_eq!(
            BuiltinModel::from_identifier("all-MiniLM-L6-v2"),
            Some(BuiltinModel::AllMiniLmL6V2)
        );
        assert_eq!(
            BuiltinModel::from_identifier("BAAI/bge-small-en-v1.5"),
            Some(BuiltinModel::BgeSmallEnV15)
        );
        assert_eq!(BuiltinModel::from_identifier("acme/custom-encoder"), None);
    }

    #[test]
    fn test_default_config() {
        let config = EmbedConfig::default();
        assert_eq!(config.model_name(), DEFAULT_MODEL);
        assert!(!config.is_huggingface_model());
        assert_eq!(config.builtin_model(), Some(BuiltinModel::AllMiniLmL6V2));
        assert_eq!(config.batch_size, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_user_defined_model_paths() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::from_identifier("acme/custom-encoder", temp_dir.path());

        assert!(config.is_huggingface_model());
        assert_eq!(config.hf_repo(), Some("acme/custom-encoder"));
        assert_eq!(config.hf_revision(), "main");

        let expected_dir = temp_dir.path().join("acme--custom-encoder");
        assert_eq!(config.model_path(), expected_dir);
        assert_eq!(
            config.onnx_model_path(),
            expected_dir.join("onnx").join("model.onnx")
        );
        assert_eq!(
            config.tokenizer_config.tokenizer_path,
            expected_dir.join("tokenizer.json")
        );
        assert!(matches!(
            config.validate_files(),
            Err(EmbedError::ModelFileNotFound { .. })
        ));
    }

    #[test]
    fn test_builder_defaults() {
        let temp_dir = tempdir().unwrap();
        let config = EmbedConfig::builder()
            .model_base_path(temp_dir.path())
            .model_name("all-MiniLM-L12-v2")
            .tokenizer_config(TokenizerConfig::standard(temp_dir.path()))
            .build()
            .unwrap();

        assert_eq!(config.batch_size, 32);
        assert_eq!(config.hf_revision, Some("main".to_string()));
        assert_eq!(config.onnx_file, "onnx/model.onnx");
        assert_eq!(config.builtin_model(), Some(BuiltinModel::AllMiniLmL12V2));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = EmbedConfig::default().with_batch_size(0);
        assert!(matches!(
            config.validate(),
            Err(EmbedError::InvalidConfig { .. })
        ));

        let mut config = EmbedConfig::default();
        config.model_name = "not-a-known-model".to_string();
        assert!(config.validate().is_err());
    }
}
