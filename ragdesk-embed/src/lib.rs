//! # ragdesk-embed
//!
//! Turns text into unit-length embedding vectors using local ONNX models via
//! FastEmbed. Inner products between the vectors it produces are cosine
//! similarities, which is what the retriever's flat index relies on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ragdesk_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> ragdesk_embed::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_documents(&texts).await?;
//! println!("{} embeddings of dimension {}", result.len(), result.dimension);
//!
//! // Blank queries embed to `None` instead of failing
//! assert!(provider.embed_query("   ").await?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! ## Models
//!
//! Identifiers fastembed knows about (`sentence-transformers/all-MiniLM-L6-v2`,
//! `BAAI/bge-small-en-v1.5`, ...) are loaded directly. Any other identifier is
//! treated as a HuggingFace repository with an ONNX export and fetched by the
//! [`ModelDownloader`]. Loaded models are cached per process, so a model is
//! initialized at most once no matter how many providers ask for it.
//!
//! ## Modules
//!
//! - [`config`]: model and tokenizer configuration
//! - [`provider`]: the [`EmbeddingProvider`] trait and [`FastEmbedProvider`]
//! - [`vector`]: the [`EmbeddingVector`] unit-norm vector type
//! - [`downloader`]: HuggingFace model downloading
//! - [`error`]: [`EmbedError`] and [`Result`]

pub mod config;
pub mod downloader;
pub mod error;
pub mod provider;
pub mod vector;

pub use config::{BuiltinModel, DEFAULT_MODEL, EmbedConfig, TokenizerConfig};
pub use downloader::ModelDownloader;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
pub use vector::EmbeddingVector;
