//! Fixed-dimension, unit-length embedding vectors

use crate::error::{EmbedError, Result};

/// Maximum deviation from a unit L2 norm accepted by [`EmbeddingVector::from_normalized`].
pub const NORM_TOLERANCE: f32 = 1e-3;

/// An embedding whose L2 norm is 1.0.
///
/// Because every vector is unit length, the inner product of two vectors equals
/// their cosine similarity. The dimension is the length of the vector and is fixed
/// at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Vec<f32>,
}

impl EmbeddingVector {
    /// Scale `values` to unit length.
    ///
    /// # Errors
    /// [`EmbedError::InvalidVector`] if `values` is empty, contains a non-finite
    /// value, or has zero norm.
    pub fn normalize(mut values: Vec<f32>) -> Result<Self> {
        let norm = checked_norm(&values)?;
        if norm == 0.0 {
            return Err(EmbedError::invalid_vector("cannot normalize a zero vector"));
        }
        for value in &mut values {
            *value /= norm;
        }
        Ok(Self { values })
    }

    /// Wrap values that are already unit length (within [`NORM_TOLERANCE`]).
    pub fn from_normalized(values: Vec<f32>) -> Result<Self> {
        let norm = checked_norm(&values)?;
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(EmbedError::invalid_vector(format!(
                "expected unit norm, got {norm}"
            )));
        }
        Ok(Self { values })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.values
    }

    /// Inner product with `other`, or `None` if the dimensions differ.
    pub fn dot(&self, other: &EmbeddingVector) -> Option<f32> {
        (self.dimension() == other.dimension()).then(|| dot(&self.values, &other.values))
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.values
    }
}

/// Inner product of two equal-length slices.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn checked_norm(values: &[f32]) -> Result<f32> {
    if values.is_empty() {
        return Err(EmbedError::invalid_vector("vector has no dimensions"));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::invalid_vector("vector contains non-finite values"));
    }
    Ok(dot(values, values).sqrt())
}
