//! ragdesk-retriever: document retrieval over a local directory
//!
//! Loads plain-text and PDF documents, embeds them with a sentence-embedding
//! model, keeps the vectors in an exact in-memory index persisted next to the
//! documents, and answers top-k similarity queries.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: document loading, the flat vector index and the [`Retriever`]
//! - **[`storage`]**: on-disk format of the index and its documents
//! - **[`config`]**: TOML-backed [`RetrieverConfig`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ragdesk_retriever::{Retriever, RetrieverConfig};
//!
//! # async fn example() -> ragdesk_retriever::Result<()> {
//! let config = RetrieverConfig::default().with_documents_dir("docs");
//! let retriever = Retriever::from_config(config).await?;
//!
//! // The first query builds or loads the index
//! for hit in retriever.retrieve("What color is the sky?", 3).await? {
//!     println!("{:.3} {}", hit.score, hit.document);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! documents dir → DocumentLoader → Embedder → FlatIndex → IndexStore
//!                                      ↑          ↓
//!                         query → Retriever → (document, score)
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod storage;

pub use config::{EmbeddingSettings, RetrieverConfig};
pub use error::{Result, RetrieverError};
pub use retrieval::index::{FlatIndex, SearchHit};
pub use retrieval::loader::{DocumentLoader, LoadError, LoadReport, SkippedFile};
pub use retrieval::retriever::{IndexStats, Retrieved, Retriever};
pub use storage::{IndexStore, PersistenceError, VectorPrecision};
