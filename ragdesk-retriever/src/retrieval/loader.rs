//! Reads the document corpus from a directory.
//!
//! Only the top level of the directory is scanned. Two kinds of files are
//! recognised by extension (case-insensitive):
//!
//! - `.txt`: read as UTF-8 and trimmed
//! - `.pdf`: text extracted page by page, pages joined with newlines
//!
//! All `.txt` documents come before all `.pdf` documents; within a kind files are
//! ordered by file name. Files that fail to read, or that contain no text, are
//! skipped and reported in [`LoadReport::skipped`]; they never abort the load.

use lopdf::Document;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Kinds of source files the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Paged,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Paged),
            _ => None,
        }
    }
}

/// Why a single file contributed no document.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8")]
    InvalidUtf8,

    #[error("failed to parse PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("no text content")]
    NoText,

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A file the loader gave up on, and why.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: LoadError,
}

/// Outcome of scanning a directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Document texts in load order
    pub documents: Vec<String>,
    /// Matching files that contributed nothing
    pub skipped: Vec<SkippedFile>,
}

/// Loads `.txt` and `.pdf` documents from a directory.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    directory: PathBuf,
}

impl DocumentLoader {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Load every supported document.
    ///
    /// A missing directory or one without matching files yields an empty report.
    pub async fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();

        let (text_files, paged_files) = match self.scan().await {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    "Cannot read document directory {}: {}",
                    self.directory.display(),
                    e
                );
                return report;
            }
        };

        if text_files.is_empty() && paged_files.is_empty() {
            warn!(
                "No .txt or .pdf files found in {}",
                self.directory.display()
            );
            return report;
        }

        info!(
            "Found {} .txt and {} .pdf files in {}",
            text_files.len(),
            paged_files.len(),
            self.directory.display()
        );

        for path in text_files {
            let outcome = read_text_file(&path).await;
            record(&mut report, path, outcome);
        }
        for path in paged_files {
            let outcome = read_paged_file(path.clone()).await;
            record(&mut report, path, outcome);
        }

        info!("Successfully loaded {} documents", report.documents.len());
        report
    }

    /// Convenience wrapper returning only the documents.
    pub async fn load_documents(&self) -> Vec<String> {
        self.load().await.documents
    }

    /// Matching files at the top level, split by kind and sorted by name.
    async fn scan(&self) -> std::io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut text_files = Vec::new();
        let mut paged_files = Vec::new();

        let mut entries = fs::read_dir(&self.directory).await?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        "Stopped scanning {} early: {}",
                        self.directory.display(),
                        e
                    );
                    break;
                }
            };
            let path = entry.path();
            let is_file = match entry.file_type().await {
                Ok(file_type) if file_type.is_symlink() => fs::metadata(&path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false),
                Ok(file_type) => file_type.is_file(),
                Err(_) => false,
            };
            if !is_file {
                continue;
            }
            match DocumentKind::from_path(&path) {
                Some(DocumentKind::PlainText) => text_files.push(path),
                Some(DocumentKind::Paged) => paged_files.push(path),
                None => {}
            }
        }

        text_files.sort();
        paged_files.sort();
        Ok((text_files, paged_files))
    }
}

fn record(report: &mut LoadReport, path: PathBuf, outcome: Result<String, LoadError>) {
    let outcome = match outcome {
        Ok(text) if text.is_empty() => Err(LoadError::NoText),
        other => other,
    };
    match outcome {
        Ok(text) => {
            debug!("Loaded document: {}", path.display());
            report.documents.push(text);
        }
        Err(LoadError::NoText) => {
            debug!("Skipping {}: no text content", path.display());
            report.skipped.push(SkippedFile {
                path,
                reason: LoadError::NoText,
            });
        }
        Err(reason) => {
            warn!("Skipping {}: {}", path.display(), reason);
            report.skipped.push(SkippedFile { path, reason });
        }
    }
}

async fn read_text_file(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path).await?;
    let text = String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8)?;
    Ok(text.trim().to_string())
}

async fn read_paged_file(path: PathBuf) -> Result<String, LoadError> {
    tokio::task::spawn_blocking(move || extract_pages(&path)).await?
}

/// Concatenate the text of every page, one newline after each page that has text.
fn extract_pages(path: &Path) -> Result<String, LoadError> {
    let document = Document::load(path)?;

    let pages = document.get_pages();
    let mut text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) if !page_text.trim().is_empty() => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Ok(_) => {}
            Err(e) => debug!(
                "No text extracted from page {} of {}: {}",
                page_number,
                path.display(),
                e
            ),
        }
    }

    debug!("Extracted {} pages from {}", pages.len(), path.display());
    Ok(text.trim().to_string())
}
