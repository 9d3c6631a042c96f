//! On-disk persistence for the vector index and its documents
//!
//! An index saved at `data/vectors.index` is spread over three sibling files:
//!
//! ```text
//! data/vectors.index       binary vector blob (header, rows, blake3 digest)
//! data/vectors.docs.txt    one escaped document per line, row-aligned
//! data/vectors.meta.json   informational metadata (optional)
//! ```
//!
//! Row `i` of the vector blob always belongs to line `i` of the document file.
//! The vector blob is written last and records a digest of the document file it
//! was saved with; loading a document file with any other digest is an error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod index_store;

pub use index_store::{IndexMetadata, IndexStore, StoredIndex};

/// Numeric precision of the persisted vector rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorPrecision {
    /// Full 32-bit floats, lossless round trip
    #[default]
    F32,
    /// IEEE half floats, half the size; rows are re-normalized on load
    F16,
}

impl VectorPrecision {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::F32 => 0,
            Self::F16 => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::F32),
            1 => Some(Self::F16),
            _ => None,
        }
    }

    /// Bytes used per stored value
    pub fn value_size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
        }
    }
}

impl std::fmt::Display for VectorPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F16 => write!(f, "f16"),
        }
    }
}

impl std::str::FromStr for VectorPrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" | "full" => Ok(Self::F32),
            "f16" | "float16" | "half" => Ok(Self::F16),
            _ => Err(format!("Invalid precision: '{s}'. Valid values are: f32, f16")),
        }
    }
}

/// Failure to read or write index artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt index artifact {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("index has {rows} rows but {documents} documents were given")]
    Misaligned { rows: usize, documents: usize },
}

impl PersistenceError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
