//! Exact inner-product index over unit-length vectors.
//!
//! Rows are stored contiguously in insertion order; row `i` belongs to document
//! `i`. Search compares the query against every row, so results are exact. With
//! unit-length vectors the inner product is the cosine similarity.

use crate::error::{Result, RetrieverError};
use ragdesk_embed::EmbeddingVector;
use ragdesk_embed::vector::dot;
use std::cmp::Ordering;

/// A single search result: the matching row and its similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

/// Brute-force similarity index with a fixed dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// A zero-row index. Still has a dimension, taken from the embedder.
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build an index holding `vectors` in the given order.
    ///
    /// # Errors
    /// [`RetrieverError::DimensionMismatch`] if any vector's dimension differs from
    /// `dimension`.
    pub fn build(dimension: usize, vectors: Vec<EmbeddingVector>) -> Result<Self> {
        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.dimension() != dimension {
                return Err(RetrieverError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.dimension(),
                });
            }
            data.extend_from_slice(vector.as_slice());
        }
        Ok(Self { dimension, data })
    }

    /// Rebuild an index from row-major values, e.g. after reading it from disk.
    pub fn from_rows(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(RetrieverError::config("index dimension must be positive"));
        }
        if data.len() % dimension != 0 {
            return Err(RetrieverError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// All rows, concatenated.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// The `k` rows with the highest inner product against `query`.
    ///
    /// Returns at most `min(k, len())` hits in descending score order. Equal
    /// scores are ordered by row, so repeated searches give identical results.
    ///
    /// # Errors
    /// [`RetrieverError::DimensionMismatch`] if the query's dimension differs from
    /// the index's.
    pub fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<SearchHit>> {
        if query.dimension() != self.dimension {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dimension,
                actual: query.dimension(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, values)| SearchHit {
                row,
                score: dot(query.as_slice(), values),
            })
            .collect();

        let k = k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_unstable_by(rank);
        Ok(hits)
    }
}

/// Descending score, then ascending row. A total order, so ties are stable.
fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.row.cmp(&b.row))
}
