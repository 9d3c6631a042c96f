//! The retriever ties loading, embedding, indexing and persistence together.
//!
//! A [`Retriever`] starts uninitialized. The first call that needs the index
//! either loads the persisted one or, if none exists, builds it from the
//! document directory and saves it. That transition runs at most once at a time:
//! concurrent callers queue behind a single gate and share its outcome. A failed
//! initialization leaves the retriever uninitialized, so a later call tries again.
//!
//! The ready index is held as an `Arc` behind a read-write lock. Queries clone
//! the `Arc` and search without holding the lock; [`Retriever::rebuild`] builds a
//! complete replacement first and swaps it in with a single write.

use super::index::FlatIndex;
use super::loader::DocumentLoader;
use crate::config::RetrieverConfig;
use crate::error::{Result, RetrieverError};
use crate::storage::{IndexStore, PersistenceError, StoredIndex};
use ragdesk_embed::{EmbedError, EmbeddingProvider, FastEmbedProvider};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A retrieved document with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieved {
    pub document: String,
    /// Cosine similarity, at most 1.0
    pub score: f32,
    /// Row of the document in the index
    pub row: usize,
}

/// Size of the index currently in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub rows: usize,
    pub documents: usize,
    pub dimension: usize,
}

/// An index and the documents its rows belong to.
#[derive(Debug)]
struct ReadyIndex {
    index: FlatIndex,
    documents: Vec<String>,
}

impl ReadyIndex {
    fn stats(&self) -> IndexStats {
        IndexStats {
            rows: self.index.len(),
            documents: self.documents.len(),
            dimension: self.index.dimension(),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    /// Failure of the most recent initialization attempt
    last_error: Option<Arc<RetrieverError>>,
}

/// Answers similarity queries over a document directory.
pub struct Retriever {
    config: RetrieverConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    loader: DocumentLoader,
    store: IndexStore,
    ready: RwLock<Option<Arc<ReadyIndex>>>,
    gate: Mutex<GateState>,
    /// Finished initialization attempts; bumped while the gate is held
    attempts: AtomicU64,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .field("embedder", &self.embedder.provider_name())
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create an uninitialized retriever. Nothing is read until first use.
    pub fn new(config: RetrieverConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let loader = DocumentLoader::new(&config.documents_dir);
        let store = IndexStore::new(&config.index_path)
            .with_precision(config.precision)
            .with_model_name(config.embedding.model.clone());
        Self {
            config,
            embedder,
            loader,
            store,
            ready: RwLock::new(None),
            gate: Mutex::new(GateState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Validate `config`, load its embedding model and create a retriever.
    ///
    /// # Errors
    /// [`RetrieverError::Config`] for invalid settings, or
    /// [`RetrieverError::ModelLoad`] if the model cannot be initialized.
    pub async fn from_config(config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        let provider = FastEmbedProvider::create(config.to_embed_config()).await?;
        info!(
            "Embedding model {} ready ({} dimensions)",
            config.embedding.model,
            provider.embedding_dimension()
        );
        Ok(Self::new(config, Arc::new(provider)))
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub async fn is_ready(&self) -> bool {
        self.ready.read().await.is_some()
    }

    /// Statistics of the in-memory index, or `None` before initialization.
    pub async fn stats(&self) -> Option<IndexStats> {
        self.ready.read().await.as_ref().map(|ready| ready.stats())
    }

    /// Initialize now instead of on the first query.
    ///
    /// # Errors
    /// [`RetrieverError::Initialization`] wrapping the failure that stopped
    /// initialization. Every caller queued behind that attempt receives the same
    /// wrapped failure.
    pub async fn ensure_ready(&self) -> Result<IndexStats> {
        Ok(self.ready_index().await?.stats())
    }

    /// Retrieve up to `top_k` documents most similar to `query`, best first.
    ///
    /// A blank query returns no results. Rows without a document are dropped.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Retrieved>> {
        let ready = self.ready_index().await?;
        if ready.index.is_empty() {
            debug!("Index is empty, returning no results");
            return Ok(Vec::new());
        }

        let Some(query_vector) = self.embedder.embed_query(query).await? else {
            debug!("Blank query, returning no results");
            return Ok(Vec::new());
        };

        let k = top_k.min(ready.index.len());
        let hits = ready.index.search(&query_vector, k)?;

        let results = hits
            .into_iter()
            .filter_map(|hit| match ready.documents.get(hit.row) {
                Some(document) => Some(Retrieved {
                    document: document.clone(),
                    score: hit.score,
                    row: hit.row,
                }),
                None => {
                    debug!("Dropping row {} with no document", hit.row);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Query returned {} results", results.len());
        Ok(results)
    }

    /// [`retrieve`](Self::retrieve) with the configured `top_k`.
    pub async fn search(&self, query: &str) -> Result<Vec<Retrieved>> {
        self.retrieve(query, self.config.top_k).await
    }

    /// Rescan the document directory, re-embed and overwrite the persisted index.
    ///
    /// The current index keeps serving queries until the new one is complete. On
    /// failure it stays in place.
    pub async fn rebuild(&self) -> Result<IndexStats> {
        let mut gate = self.gate.lock().await;
        info!("Rebuilding index from {}", self.config.documents_dir.display());

        let ready = Arc::new(self.build_and_persist().await?);
        let stats = ready.stats();
        *self.ready.write().await = Some(ready);
        gate.last_error = None;

        info!("Rebuild complete: {} documents indexed", stats.rows);
        Ok(stats)
    }

    async fn ready_index(&self) -> Result<Arc<ReadyIndex>> {
        if let Some(ready) = self.ready.read().await.as_ref() {
            return Ok(Arc::clone(ready));
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut gate = self.gate.lock().await;

        if let Some(ready) = self.ready.read().await.as_ref() {
            return Ok(Arc::clone(ready));
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(error) = &gate.last_error {
                debug!("Initialization failed while waiting; reporting the same failure");
                return Err(RetrieverError::Initialization(Arc::clone(error)));
            }
        }

        let outcome = self.initialize().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(ready) => {
                let ready = Arc::new(ready);
                *self.ready.write().await = Some(Arc::clone(&ready));
                gate.last_error = None;
                Ok(ready)
            }
            Err(error) => {
                warn!("Index initialization failed: {}", error);
                let error = Arc::new(error);
                gate.last_error = Some(Arc::clone(&error));
                Err(RetrieverError::Initialization(error))
            }
        }
    }

    async fn initialize(&self) -> Result<ReadyIndex> {
        if self.store.exists() {
            info!(
                "Loading persisted index from {}",
                self.store.vectors_path().display()
            );
            self.load_persisted().await
        } else {
            info!(
                "No index at {}, building from {}",
                self.store.vectors_path().display(),
                self.config.documents_dir.display()
            );
            self.build_and_persist().await
        }
    }

    async fn load_persisted(&self) -> Result<ReadyIndex> {
        let store = self.store.clone();
        let StoredIndex {
            index,
            documents,
            metadata,
        } = tokio::task::spawn_blocking(move || store.load()).await??;

        let expected = self.embedder.embedding_dimension();
        if index.dimension() != expected {
            return Err(RetrieverError::DimensionMismatch {
                expected,
                actual: index.dimension(),
            });
        }

        if let Some(metadata) = metadata.as_ref() {
            if let Some(model) = metadata.model_name.as_deref() {
                if model != self.config.embedding.model {
                    warn!(
                        "Index was built with model {} but {} is configured",
                        model, self.config.embedding.model
                    );
                }
            }
        }
        if documents.is_empty() && !index.is_empty() {
            warn!(
                "Index has {} rows but no documents; queries will return nothing",
                index.len()
            );
        } else if index.len() != documents.len() {
            return Err(PersistenceError::Misaligned {
                rows: index.len(),
                documents: documents.len(),
            }
            .into());
        }

        Ok(ReadyIndex { index, documents })
    }

    async fn build_and_persist(&self) -> Result<ReadyIndex> {
        let report = self.loader.load().await;
        if !report.skipped.is_empty() {
            info!("{} files skipped while loading documents", report.skipped.len());
        }
        let documents = report.documents;
        let dimension = self.embedder.embedding_dimension();

        let index = if documents.is_empty() {
            info!("No documents to embed, building an empty index");
            FlatIndex::empty(dimension)
        } else {
            info!("Embedding {} documents", documents.len());
            let result = self.embedder.embed_documents(&documents).await?;
            if result.len() != documents.len() {
                return Err(EmbedError::embedding(format!(
                    "expected {} embeddings, got {}",
                    documents.len(),
                    result.len()
                ))
                .into());
            }
            FlatIndex::build(dimension, result.embeddings)?
        };

        let store = self.store.clone();
        let ready = tokio::task::spawn_blocking(move || {
            store.save(&index, &documents)?;
            Ok::<_, RetrieverError>(ReadyIndex { index, documents })
        })
        .await??;

        info!(
            "Index built with {} rows and saved to {}",
            ready.index.len(),
            self.store.vectors_path().display()
        );
        Ok(ready)
    }
}
