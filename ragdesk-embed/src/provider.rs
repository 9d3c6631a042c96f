//! Embedding provider implementations

use crate::config::{BuiltinModel, EmbedConfig};
use crate::downloader::ModelDownloader;
use crate::error::{EmbedError, Result};
use crate::vector::EmbeddingVector;
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, Pooling, TextEmbedding, TokenizerFiles,
    UserDefinedEmbeddingModel,
};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::fs;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<EmbeddingVector>,
    /// The dimension of each embedding vector (0 when empty)
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first vector.
    pub fn new(embeddings: Vec<EmbeddingVector>) -> Self {
        let dimension = embeddings.first().map(|e| e.dimension()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Loaded models keyed by configuration. Held across a load so two callers asking
/// for the same model never load it twice.
static MODEL_CACHE: OnceLock<tokio::sync::Mutex<HashMap<String, ModelCacheEntry>>> =
    OnceLock::new();

fn get_model_cache() -> &'static tokio::sync::Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| tokio::sync::Mutex::new(HashMap::new()))
}

/// Trait for embedding providers that turn text into unit-length vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of documents, preserving input order.
    ///
    /// An empty input yields an empty result rather than an error.
    async fn embed_documents(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Embed a single query.
    ///
    /// Returns `Ok(None)` for blank or whitespace-only input.
    async fn embed_query(&self, text: &str) -> Result<Option<EmbeddingVector>> {
        if text.trim().is_empty() {
            tracing::warn!("Empty query provided for embedding");
            return Ok(None);
        }
        let result = self.embed_documents(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .map(Some)
            .ok_or_else(|| EmbedError::embedding(anyhow::anyhow!("no embedding generated for query")))
    }

    /// Dimension of every vector this provider produces
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// FastEmbed-based embedding provider running ONNX models locally
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`initialize`](Self::initialize)
    /// before embedding anything.
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: None,
            dimension: 0,
        }
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Load the model, reusing an already-loaded instance for the same configuration.
    ///
    /// # Errors
    /// [`EmbedError::ModelLoad`] (or another model-load family error) if the model
    /// cannot be fetched or initialized.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );

        let cache_key = self.create_cache_key();
        let mut cache = get_model_cache().lock().await;

        if let Some((model, dimension)) = cache.get(&cache_key) {
            tracing::info!("Using cached model for: {}", self.config.model_name());
            self.model = Some(Arc::clone(model));
            self.dimension = *dimension;
            drop(cache);
            return self.validate_model().await;
        }

        let (model, dimension) = match self.config.builtin_model() {
            Some(builtin) => self.load_builtin_model(builtin).await?,
            None => {
                tracing::info!(
                    "Downloading HuggingFace model: {}",
                    self.config.model_name()
                );
                ModelDownloader::new(&self.config.model_base_path)?
                    .ensure_model(&self.config)
                    .await?;
                self.config.validate_files()?;
                self.load_user_defined_model().await?
            }
        };

        let model = Arc::new(Mutex::new(model));
        cache.insert(cache_key, (Arc::clone(&model), dimension));
        drop(cache);

        self.model = Some(model);
        self.dimension = dimension;

        self.validate_model().await
    }

    /// Create a cache key based on the model configuration
    fn create_cache_key(&self) -> String {
        let config_json = serde_json::to_string(&self.config).unwrap_or_default();

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        format!("v1:{:x}", hasher.finish())
    }

    async fn load_builtin_model(&self, builtin: BuiltinModel) -> Result<(TextEmbedding, usize)> {
        tracing::info!(
            "Using built-in fastembed model: {}",
            self.config.model_name()
        );

        let model_name = self.config.model_name().to_string();
        let cache_dir = self.config.model_base_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
            let init_options = InitOptions::new(fastembed_model(builtin))
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false);

            let model = TextEmbedding::try_new(init_options)
                .map_err(|e| EmbedError::model_load(&model_name, e))?;
            detect_dimension(model, &model_name)
        })
        .await?
    }

    /// Load a user-defined ONNX model from downloaded HuggingFace files
    async fn load_user_defined_model(&self) -> Result<(TextEmbedding, usize)> {
        tracing::info!("Loading user-defined model: {}", self.config.model_name());

        let onnx_file = fs::read(self.config.onnx_model_path()).await?;

        let tokenizer_config = self.config.tokenizer_config();
        let tokenizer_file = fs::read(&tokenizer_config.tokenizer_path).await?;
        let config_file = fs::read(&tokenizer_config.config_path).await?;
        let special_tokens_map_file = fs::read(&tokenizer_config.special_tokens_map_path).await?;

        let tokenizer_config_file = match &tokenizer_config.tokenizer_config_path {
            Some(path) if path.exists() => fs::read(path).await?,
            _ => {
                let minimal_config = serde_json::json!({
                    "clean_up_tokenization_spaces": true,
                    "do_lower_case": false,
                    "model_max_length": 512,
                    "tokenizer_class": "BertTokenizer"
                });
                serde_json::to_vec_pretty(&minimal_config)
                    .map_err(|e| EmbedError::External { source: e.into() })?
            }
        };

        let tokenizer_files = TokenizerFiles {
            tokenizer_file,
            config_file,
            special_tokens_map_file,
            tokenizer_config_file,
        };

        let user_model =
            UserDefinedEmbeddingModel::new(onnx_file, tokenizer_files).with_pooling(Pooling::Mean);

        let model_name = self.config.model_name().to_string();
        tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
            let model = TextEmbedding::try_new_from_user_defined(user_model, Default::default())
                .map_err(|e| EmbedError::model_load(&model_name, e))?;
            detect_dimension(model, &model_name)
        })
        .await?
    }

    /// Validate that the model is working correctly
    async fn validate_model(&self) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EmbedError::invalid_config("Model not initialized"))?;

        let model_clone = Arc::clone(model);
        let model_name = self.config.model_name().to_string();
        let validation_result = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model_guard = model_clone
                .lock()
                .map_err(|_| EmbedError::invalid_config("model lock poisoned"))?;
            model_guard
                .embed(vec!["validation test".to_string()], None)
                .map_err(|e| EmbedError::model_load(&model_name, e))
        })
        .await??;

        let Some(embedding) = validation_result.first() else {
            return Err(EmbedError::invalid_config(
                "Model validation failed: no embeddings generated",
            ));
        };

        if embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "Model validation failed: expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        if embedding.iter().any(|value| !value.is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model validation failed: non-finite values in embedding",
            ));
        }

        tracing::debug!("Model validation passed for: {}", self.config.model_name());
        Ok(())
    }

    /// Drop every cached model.
    pub async fn clear_cache() {
        get_model_cache().lock().await.clear();
        tracing::info!("Model cache cleared");
    }

    /// Number of models currently cached.
    pub async fn cache_size() -> usize {
        get_model_cache().lock().await.len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            tracing::warn!("No documents provided for embedding");
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let chunk = chunk.to_vec();
            let model_clone = Arc::clone(model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                tracing::debug!("Processing batch of {} texts", chunk.len());

                let mut model_guard = model_clone
                    .lock()
                    .map_err(|_| EmbedError::embedding(anyhow::anyhow!("model lock poisoned")))?;
                model_guard.embed(chunk, None).map_err(EmbedError::embedding)
            })
            .await??;

            for values in batch_embeddings {
                if values.len() != self.dimension {
                    return Err(EmbedError::embedding(anyhow::anyhow!(
                        "model returned dimension {}, expected {}",
                        values.len(),
                        self.dimension
                    )));
                }
                all_embeddings.push(EmbeddingVector::normalize(values)?);
            }
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

fn fastembed_model(model: BuiltinModel) -> EmbeddingModel {
    match model {
        BuiltinModel::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
        BuiltinModel::AllMiniLmL12V2 => EmbeddingModel::AllMiniLML12V2,
        BuiltinModel::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
        BuiltinModel::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
    }
}

/// Run one embedding to learn the output dimension of a freshly loaded model.
fn detect_dimension(mut model: TextEmbedding, model_name: &str) -> Result<(TextEmbedding, usize)> {
    let sample = model
        .embed(vec!["test".to_string()], None)
        .map_err(|e| EmbedError::model_load(model_name, e))?;
    let dimension = sample.first().map(|emb| emb.len()).unwrap_or(0);
    if dimension == 0 {
        return Err(EmbedError::model_load(
            model_name,
            anyhow::anyhow!("model produced an empty embedding"),
        ));
    }

    tracing::info!("Model {} loaded successfully. Dimension: {}", model_name, dimension);
    Ok((model, dimension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_cache_empties_model_cache() {
        FastEmbedProvider::clear_cache().await;
        assert_eq!(FastEmbedProvider::cache_size().await, 0);
    }

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![
            EmbeddingVector::normalize(vec![0.1, 0.2, 0.3]).unwrap(),
            EmbeddingVector::normalize(vec![0.4, 0.5, 0.6]).unwrap(),
        ];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_fastembed_provider_creation() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 0);
    }

    #[tokio::test]
    async fn test_uninitialized_provider() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        let empty = provider.embed_documents(&[]).await.unwrap();
        assert!(empty.is_empty());

        let blank = provider.embed_query("   \n\t").await.unwrap();
        assert!(blank.is_none());

        let err = provider
            .embed_documents(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_to_initialize() {
        let config = EmbedConfig::default().with_batch_size(0);
        let err = FastEmbedProvider::create(config).await.unwrap_err();
        assert!(err.is_model_load());
    }

    #[test]
    fn test_cache_key_generation() {
        let key1 = FastEmbedProvider::new(EmbedConfig::default()).create_cache_key();
        let key2 = FastEmbedProvider::new(EmbedConfig::default()).create_cache_key();

        assert_eq!(key1, key2, "Same config should produce same cache key");
        assert!(key1.starts_with("v1:"));

        let other = EmbedConfig::from_identifier("BAAI/bge-small-en-v1.5", "models");
        let key3 = FastEmbedProvider::new(other).create_cache_key();
        assert_ne!(key1, key3, "Different model should produce different cache key");
    }

    #[tokio::test]
    #[ignore] // Downloads all-MiniLM-L6-v2 - run with: cargo test -p ragdesk-embed -- --ignored
    async fn test_minilm_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(provider.embedding_dimension(), 384);
        assert!(FastEmbedProvider::cache_size().await >= 1);

        let texts = vec![
            "The sky is blue.".to_string(),
            "Grass is green in spring.".to_string(),
            "Compilers translate source code.".to_string(),
        ];
        let batch = provider.embed_documents(&texts).await?;
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.dimension, 384);
        for embedding in &batch.embeddings {
            let norm = embedding.dot(embedding).unwrap();
            assert!((norm - 1.0).abs() < 1e-4, "embedding should be unit length");
        }

        let query = provider
            .embed_query("What color is the sky?")
            .await?
            .expect("non-blank query embeds");
        let sky = query.dot(&batch.embeddings[0]).unwrap();
        let code = query.dot(&batch.embeddings[2]).unwrap();
        assert!(sky > code, "sky={sky} code={code}");

        // A second provider for the same model reuses the loaded instance
        let before = FastEmbedProvider::cache_size().await;
        let again = FastEmbedProvider::create(EmbedConfig::default()).await?;
        assert_eq!(FastEmbedProvider::cache_size().await, before);
        assert_eq!(again.embedding_dimension(), 384);

        Ok(())
    }
}
