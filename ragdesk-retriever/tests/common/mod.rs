//! Shared helpers for the retriever integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ragdesk_embed::{EmbedError, EmbeddingProvider, EmbeddingResult, EmbeddingVector};
use ragdesk_retriever::{Retriever, RetrieverConfig};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word is hashed into one
/// of `DIMENSION` buckets. Texts sharing words get positive similarity.
#[derive(Default)]
pub struct HashingEmbedder {
    pub document_batches: AtomicUsize,
    pub queries: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail_documents: bool,
    /// Makes `embed_query` fail while set
    pub fail_queries: AtomicBool,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            fail_documents: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> usize {
        self.document_batches.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn set_query_failure(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    fn vector_for(text: &str) -> ragdesk_embed::Result<EmbeddingVector> {
        let mut values = vec![0.0f32; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            values[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
        }
        if values.iter().all(|v| *v == 0.0) {
            values[0] = 1.0;
        }
        EmbeddingVector::normalize(values)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> ragdesk_embed::Result<EmbeddingResult> {
        self.document_batches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_documents {
            return Err(EmbedError::embedding("inference exploded"));
        }
        let embeddings = texts
            .iter()
            .map(|text| Self::vector_for(text))
            .collect::<ragdesk_embed::Result<Vec<_>>>()?;
        Ok(EmbeddingResult::new(embeddings))
    }

    async fn embed_query(&self, text: &str) -> ragdesk_embed::Result<Option<EmbeddingVector>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(EmbedError::embedding("query inference failed"));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        Self::vector_for(text).map(Some)
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

/// Configuration rooted in `dir`: documents in `dir/docs`, index in `dir/index`.
pub fn config_in(dir: &Path) -> RetrieverConfig {
    RetrieverConfig::default()
        .with_documents_dir(dir.join("docs"))
        .with_index_path(dir.join("index").join("vectors.index"))
}

pub fn write_doc(dir: &Path, name: &str, contents: &str) {
    let docs = dir.join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join(name), contents).unwrap();
}

pub fn retriever_with(dir: &Path, embedder: Arc<HashingEmbedder>) -> Retriever {
    Retriever::new(config_in(dir), embedder)
}
