//! Saving and loading a [`FlatIndex`] together with its documents.
//!
//! ## Vector blob layout (little-endian)
//!
//! ```text
//! offset  size  field
//! 0       4     magic "RDVI"
//! 4       4     format version (u32)
//! 8       1     precision tag (0 = f32, 1 = f16)
//! 9       3     reserved, zero
//! 12      4     dimension (u32)
//! 16      8     row count (u64)
//! 24      32    blake3 digest of the document file
//! 56      n     rows × dimension values
//! 56+n    32    blake3 digest of bytes [0, 56+n)
//! ```
//!
//! Each artifact is written to a temporary file in the target directory and
//! renamed into place, so a failed save never leaves a truncated file behind.
//! The two files are replaced one after the other, so a save that fails between
//! them can leave new documents next to old vectors. The document digest in the
//! vector header detects that pairing on load.

use super::{PersistenceError, VectorPrecision};
use crate::retrieval::index::FlatIndex;
use chrono::{DateTime, Utc};
use half::f16;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

type Result<T> = std::result::Result<T, PersistenceError>;

const MAGIC: &[u8; 4] = b"RDVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 56;
const DIGEST_LEN: usize = 32;

/// Informational sidecar describing how an index was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub model_name: Option<String>,
    pub dimension: usize,
    pub document_count: usize,
    pub precision: VectorPrecision,
    pub created_at: DateTime<Utc>,
}

/// Everything read back by [`IndexStore::load`].
#[derive(Debug, Clone)]
pub struct StoredIndex {
    pub index: FlatIndex,
    /// Row-aligned documents; empty if the document file was missing
    pub documents: Vec<String>,
    /// Present only if the sidecar exists and parses
    pub metadata: Option<IndexMetadata>,
}

/// Persists an index and its documents under a base path.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
    precision: VectorPrecision,
    model_name: Option<String>,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            precision: VectorPrecision::default(),
            model_name: None,
        }
    }

    pub fn with_precision(mut self, precision: VectorPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Model name recorded in the metadata sidecar
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// Path of the binary vector blob
    pub fn vectors_path(&self) -> &Path {
        &self.path
    }

    /// Path of the line-delimited document file
    pub fn documents_path(&self) -> PathBuf {
        self.path.with_extension("docs.txt")
    }

    /// Path of the JSON metadata sidecar
    pub fn metadata_path(&self) -> PathBuf {
        self.path.with_extension("meta.json")
    }

    /// Whether a saved index exists. Never fails.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write `index` and `documents`, replacing any previous save.
    ///
    /// # Errors
    /// [`PersistenceError::Misaligned`] if the row and document counts differ, or
    /// [`PersistenceError::Io`] if any artifact cannot be written.
    pub fn save(&self, index: &FlatIndex, documents: &[String]) -> Result<()> {
        if index.len() != documents.len() {
            return Err(PersistenceError::Misaligned {
                rows: index.len(),
                documents: documents.len(),
            });
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::io("create directory", parent, e))?;
        }

        let result = self.write_artifacts(index, documents);
        match &result {
            Ok(()) => info!(
                "Saved index with {} vectors to {}",
                index.len(),
                self.path.display()
            ),
            Err(e) => error!("Failed to save index: {}", e),
        }
        result
    }

    fn write_artifacts(&self, index: &FlatIndex, documents: &[String]) -> Result<()> {
        let encoded_documents = encode_documents(documents);
        let documents_digest = blake3::hash(encoded_documents.as_bytes());
        write_atomic(&self.documents_path(), encoded_documents.as_bytes())?;

        let metadata = IndexMetadata {
            format_version: FORMAT_VERSION,
            model_name: self.model_name.clone(),
            dimension: index.dimension(),
            document_count: documents.len(),
            precision: self.precision,
            created_at: Utc::now(),
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata).map_err(|e| {
            PersistenceError::io("serialize metadata for", self.metadata_path(), e.into())
        })?;
        write_atomic(&self.metadata_path(), &metadata_json)?;

        write_atomic(
            &self.path,
            &encode_vectors(index, self.precision, &documents_digest),
        )
    }

    /// Read back an index written by [`save`](Self::save).
    ///
    /// A missing document file yields an empty document list, not an error.
    ///
    /// # Errors
    /// [`PersistenceError::Io`] if the vector blob cannot be read, or
    /// [`PersistenceError::Corrupt`] if either artifact is malformed or the
    /// document file is not the one saved with these vectors.
    pub fn load(&self) -> Result<StoredIndex> {
        let bytes = fs::read(&self.path).map_err(|e| {
            error!("Failed to read index {}: {}", self.path.display(), e);
            PersistenceError::io("read", &self.path, e)
        })?;
        let (index, precision, documents_digest) = decode_vectors(&bytes, &self.path)?;
        debug!(
            "Decoded {} {} vectors of dimension {}",
            index.len(),
            precision,
            index.dimension()
        );

        let documents_path = self.documents_path();
        let documents = match fs::read(&documents_path) {
            Ok(raw) => {
                if blake3::hash(&raw) != documents_digest {
                    error!(
                        "Document file {} does not belong to index {}",
                        documents_path.display(),
                        self.path.display()
                    );
                    return Err(PersistenceError::corrupt(
                        &documents_path,
                        "document file does not match the saved vectors",
                    ));
                }
                let text = String::from_utf8(raw).map_err(|_| {
                    PersistenceError::corrupt(&documents_path, "document file is not valid UTF-8")
                })?;
                let documents = decode_documents(&text);
                if documents.len() != index.len() {
                    return Err(PersistenceError::corrupt(
                        &documents_path,
                        format!(
                            "{} documents for {} vector rows",
                            documents.len(),
                            index.len()
                        ),
                    ));
                }
                documents
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Document file {} is missing; results will carry no documents",
                    documents_path.display()
                );
                Vec::new()
            }
            Err(e) => return Err(PersistenceError::io("read", documents_path, e)),
        };

        let metadata = self.load_metadata();

        info!(
            "Loaded index with {} vectors and {} documents from {}",
            index.len(),
            documents.len(),
            self.path.display()
        );
        Ok(StoredIndex {
            index,
            documents,
            metadata,
        })
    }

    fn load_metadata(&self) -> Option<IndexMetadata> {
        let path = self.metadata_path();
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Ignoring unreadable metadata {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| PersistenceError::io("create temporary file in", dir, e))?;
    file.write_all(contents)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| PersistenceError::io("write", path, e))?;
    file.persist(path)
        .map_err(|e| PersistenceError::io("replace", path, e.error))?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

fn encode_vectors(
    index: &FlatIndex,
    precision: VectorPrecision,
    documents_digest: &blake3::Hash,
) -> Vec<u8> {
    let values = index.as_flat();
    let mut bytes =
        Vec::with_capacity(HEADER_LEN + values.len() * precision.value_size() + DIGEST_LEN);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(precision.tag());
    bytes.extend_from_slice(&[0; 3]);
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(documents_digest.as_bytes());
    match precision {
        VectorPrecision::F32 => {
            for value in values {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        VectorPrecision::F16 => {
            for value in values {
                bytes.extend_from_slice(&f16::from_f32(*value).to_le_bytes());
            }
        }
    }
    let digest = blake3::hash(&bytes);
    bytes.extend_from_slice(digest.as_bytes());
    bytes
}

fn decode_vectors(
    bytes: &[u8],
    path: &Path,
) -> Result<(FlatIndex, VectorPrecision, blake3::Hash)> {
    let corrupt = |reason: &str| PersistenceError::corrupt(path, reason);

    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(corrupt("file is too short"));
    }
    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    if blake3::hash(body).as_bytes() != digest {
        return Err(corrupt("checksum mismatch"));
    }
    if &body[0..4] != MAGIC {
        return Err(corrupt("not a ragdesk vector index"));
    }

    let version = u32::from_le_bytes(read_array(&body[4..8]));
    if version != FORMAT_VERSION {
        return Err(PersistenceError::corrupt(
            path,
            format!("unsupported format version {version}"),
        ));
    }
    let precision = VectorPrecision::from_tag(body[8]).ok_or_else(|| corrupt("unknown precision"))?;
    let dimension = u32::from_le_bytes(read_array(&body[12..16])) as usize;
    let rows = u64::from_le_bytes(read_array(&body[16..24])) as usize;
    let documents_digest = blake3::Hash::from_bytes(read_array(&body[24..HEADER_LEN]));

    let payload = &body[HEADER_LEN..];
    let expected_len = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(precision.value_size()));
    if expected_len != Some(payload.len()) {
        return Err(corrupt("payload length does not match header"));
    }

    let mut data: Vec<f32> = match precision {
        VectorPrecision::F32 => payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(read_array(b)))
            .collect(),
        VectorPrecision::F16 => payload
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes(read_array(b)).to_f32())
            .collect(),
    };
    if precision == VectorPrecision::F16 && dimension > 0 {
        renormalize_rows(&mut data, dimension);
    }

    let index = FlatIndex::from_rows(dimension, data)
        .map_err(|e| PersistenceError::corrupt(path, e.to_string()))?;
    Ok((index, precision, documents_digest))
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Undo the drift half-precision rounding introduces in the unit norm.
fn renormalize_rows(data: &mut [f32], dimension: usize) {
    for row in data.chunks_exact_mut(dimension) {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
    }
}

/// One document per line; `\`, LF and CR are escaped so each stays on one line.
fn encode_documents(documents: &[String]) -> String {
    let mut out = String::with_capacity(documents.iter().map(|d| d.len() + 1).sum());
    for document in documents {
        for c in document.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                c => out.push(c),
            }
        }
        out.push('\n');
    }
    out
}

fn decode_documents(text: &str) -> Vec<String> {
    text.lines().map(unescape_line).collect()
}

fn unescape_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            // Unknown escapes are kept verbatim
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdesk_embed::EmbeddingVector;
    use tempfile::tempdir;

    fn sample_index() -> FlatIndex {
        let vectors = [[1.0, 2.0, 2.0], [0.0, 3.0, 4.0], [1.0, 0.0, 0.0]]
            .iter()
            .map(|v| EmbeddingVector::normalize(v.to_vec()).unwrap())
            .collect();
        FlatIndex::build(3, vectors).unwrap()
    }

    fn sample_documents() -> Vec<String> {
        vec![
            "The sky is blue.".to_string(),
            "Line one\nLine two\r\nLine three".to_string(),
            r"C:\temp\notes and a literal \n sequence".to_string(),
        ]
    }

    #[test]
    fn test_round_trip_preserves_vectors_and_documents() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("nested/dir/vectors.index"))
            .with_model_name("test-model");
        let index = sample_index();
        let documents = sample_documents();

        assert!(!store.exists());
        store.save(&index, &documents).unwrap();
        assert!(store.exists());
        assert!(store.documents_path().ends_with("vectors.docs.txt"));

        let stored = store.load().unwrap();
        assert_eq!(stored.index, index);
        assert_eq!(stored.documents, documents);

        let metadata = stored.metadata.unwrap();
        assert_eq!(metadata.model_name.as_deref(), Some("test-model"));
        assert_eq!(metadata.document_count, 3);
        assert_eq!(metadata.dimension, 3);
    }

    #[test]
    fn test_documents_file_is_line_delimited() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"));
        store.save(&sample_index(), &sample_documents()).unwrap();

        let raw = fs::read_to_string(store.documents_path()).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.contains(r"Line one\nLine two\r\nLine three"));
    }

    #[test]
    fn test_empty_index_round_trip() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"));
        store.save(&FlatIndex::empty(384), &[]).unwrap();

        let stored = store.load().unwrap();
        assert!(stored.index.is_empty());
        assert_eq!(stored.index.dimension(), 384);
        assert!(stored.documents.is_empty());
    }

    #[test]
    fn test_half_precision_round_trip() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"))
            .with_precision(VectorPrecision::F16);
        let index = sample_index();
        store.save(&index, &sample_documents()).unwrap();

        let stored = store.load().unwrap();
        assert_eq!(stored.index.len(), index.len());
        for (a, b) in stored.index.as_flat().iter().zip(index.as_flat()) {
            assert!((a - b).abs() < 1e-3);
        }
        for row in 0..stored.index.len() {
            let values = stored.index.row(row).unwrap();
            let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_missing_documents_file_yields_empty_documents() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"));
        store.save(&sample_index(), &sample_documents()).unwrap();
        fs::remove_file(store.documents_path()).unwrap();

        let stored = store.load().unwrap();
        assert_eq!(stored.index.len(), 3);
        assert!(stored.documents.is_empty());
    }

    #[test]
    fn test_corrupt_vectors_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"));
        store.save(&sample_index(), &sample_documents()).unwrap();

        let mut bytes = fs::read(store.vectors_path()).unwrap();
        bytes[HEADER_LEN] ^= 0xFF;
        fs::write(store.vectors_path(), &bytes).unwrap();
        assert!(matches!(
            store.load(),
            Err(PersistenceError::Corrupt { .. })
        ));

        fs::write(store.vectors_path(), b"garbage").unwrap();
        assert!(matches!(
            store.load(),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_documents_from_a_different_save_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"));
        store.save(&sample_index(), &sample_documents()).unwrap();

        // Same row count, different order: what an overwrite that failed after
        // replacing the documents but before replacing the vectors leaves behind
        let mut reordered = sample_documents();
        reordered.rotate_left(1);
        let other = IndexStore::new(temp_dir.path().join("other.index"));
        other.save(&sample_index(), &reordered).unwrap();
        fs::copy(other.documents_path(), store.documents_path()).unwrap();

        let err = store.load().unwrap_err();
        assert!(
            matches!(&err, PersistenceError::Corrupt { path, .. } if path == &store.documents_path()),
            "unexpected error: {err}"
        );

        // Different row count is caught the same way
        other
            .save(
                &FlatIndex::build(3, vec![EmbeddingVector::normalize(vec![1.0, 0.0, 0.0]).unwrap()])
                    .unwrap(),
                &["lonely".to_string()],
            )
            .unwrap();
        fs::copy(other.documents_path(), store.documents_path()).unwrap();
        assert!(matches!(
            store.load(),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_missing_vectors_is_an_io_error() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("absent.index"));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(PersistenceError::Io { .. })));
    }

    #[test]
    fn test_save_rejects_misaligned_documents() {
        let temp_dir = tempdir().unwrap();
        let store = IndexStore::new(temp_dir.path().join("vectors.index"));
        let err = store
            .save(&sample_index(), &["only one".to_string()])
            .unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Misaligned {
                rows: 3,
                documents: 1
            }
        ));
        assert!(!store.exists());
    }

    #[test]
    fn test_unknown_escapes_survive_decoding() {
        assert_eq!(unescape_line(r"tab\there"), r"tab\there");
        assert_eq!(unescape_line(r"trailing\"), r"trailing\");
        assert_eq!(unescape_line(r"a\nb\\c"), "a\nb\\c");
    }
}
