//! HuggingFace model downloading functionality

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Downloads user-defined ONNX models from HuggingFace Hub
pub struct ModelDownloader {
    api: Api,
}

impl ModelDownloader {
    /// Create a downloader whose HTTP cache lives under `cache_dir`.
    ///
    /// Authentication uses the usual HuggingFace environment variables or cached
    /// token.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.as_ref().join(".hf-cache"))
            .with_progress(false)
            .build()
            .map_err(|e| EmbedError::model_load("huggingface-hub", e))?;
        Ok(Self { api })
    }

    /// Make sure every file a user-defined model needs is present locally.
    ///
    /// Built-in models are fetched by fastembed itself, so this does nothing for
    /// them.
    ///
    /// # Errors
    /// [`EmbedError::ModelLoad`] if a required file cannot be downloaded, or
    /// [`EmbedError::Io`] if the model directory cannot be written.
    pub async fn ensure_model(&self, config: &EmbedConfig) -> Result<()> {
        let Some(repo_id) = config.hf_repo() else {
            tracing::debug!("Not a HuggingFace model, skipping download");
            return Ok(());
        };

        if self.is_model_complete(config) {
            tracing::info!("Model {} already exists and is complete", config.model_name);
            return Ok(());
        }

        tracing::info!(
            "Downloading model {} from {}@{}",
            config.model_name,
            repo_id,
            config.hf_revision()
        );

        fs::create_dir_all(config.model_path()).await?;

        let repo = self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            config.hf_revision().to_string(),
        ));

        self.download_model_files(&repo, config).await?;

        tracing::info!("Model {} downloaded successfully", config.model_name);
        Ok(())
    }

    /// Check if the model is completely downloaded
    fn is_model_complete(&self, config: &EmbedConfig) -> bool {
        let missing = required_files(config)
            .into_iter()
            .find(|(_, local_path)| !local_path.exists());
        if let Some((_, path)) = missing {
            tracing::debug!("Missing file: {}", path.display());
            return false;
        }
        true
    }

    async fn download_model_files(&self, repo: &ApiRepo, config: &EmbedConfig) -> Result<()> {
        let mut downloads = required_files(config);
        if let Some(path) = &config.tokenizer_config.tokenizer_config_path {
            downloads.push(("tokenizer_config.json".to_string(), path.clone()));
        }

        for (remote_path, local_path) in &downloads {
            if local_path.exists() {
                tracing::debug!("File already exists: {}", local_path.display());
                continue;
            }
            if let Some(parent) = local_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            tracing::info!("Downloading {} to {}", remote_path, local_path.display());

            match repo.get(remote_path).await {
                Ok(cached) => {
                    fs::copy(&cached, local_path).await?;
                    tracing::debug!("Successfully downloaded {}", remote_path);
                }
                Err(e) if remote_path == "special_tokens_map.json" => {
                    tracing::warn!("Failed to download {}: {}", remote_path, e);
                    create_fallback_special_tokens_map(local_path).await?;
                }
                Err(e) if remote_path == "tokenizer_config.json" => {
                    tracing::info!(
                        "tokenizer_config.json unavailable ({}), will generate minimal config",
                        e
                    );
                }
                Err(e) => return Err(EmbedError::model_load(config.model_name(), e)),
            }
        }

        Ok(())
    }
}

/// Remote/local path pairs that must exist for the model to load.
fn required_files(config: &EmbedConfig) -> Vec<(String, PathBuf)> {
    let tokenizer = config.tokenizer_config();
    vec![
        (config.onnx_file.clone(), config.onnx_model_path()),
        ("tokenizer.json".to_string(), tokenizer.tokenizer_path.clone()),
        ("config.json".to_string(), tokenizer.config_path.clone()),
        (
            "special_tokens_map.json".to_string(),
            tokenizer.special_tokens_map_path.clone(),
        ),
    ]
}

async fn create_fallback_special_tokens_map(path: &Path) -> Result<()> {
    let fallback_content = serde_json::json!({
        "cls_token": "[CLS]",
        "sep_token": "[SEP]",
        "unk_token": "[UNK]",
        "pad_token": "[PAD]",
        "mask_token": "[MASK]"
    });

    let content = serde_json::to_string_pretty(&fallback_content)
        .map_err(|e| EmbedError::External { source: e.into() })?;

    fs::write(path, content).await?;
    tracing::info!("Created fallback special_tokens_map.json");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_is_model_complete_missing_files() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = EmbedConfig::from_identifier("acme/custom-encoder", temp_dir.path());
        let downloader = ModelDownloader::new(temp_dir.path())?;

        assert!(!downloader.is_model_complete(&config));
        Ok(())
    }

    #[tokio::test]
    async fn test_is_model_complete_with_files_present() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = EmbedConfig::from_identifier("acme/custom-encoder", temp_dir.path());
        for (_, path) in required_files(&config) {
            fs::create_dir_all(path.parent().unwrap()).await?;
            fs::write(&path, b"{}").await?;
        }

        let downloader = ModelDownloader::new(temp_dir.path())?;
        assert!(downloader.is_model_complete(&config));
        Ok(())
    }

    #[tokio::test]
    async fn test_builtin_model_skips_download() -> Result<()> {
        let temp_dir = tempdir()?;
        let config = EmbedConfig::from_identifier("all-MiniLM-L6-v2", temp_dir.path());
        let downloader = ModelDownloader::new(temp_dir.path())?;

        downloader.ensure_model(&config).await?;
        assert!(!config.model_path().exists());
        Ok(())
    }
}
