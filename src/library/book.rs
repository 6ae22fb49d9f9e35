//! Book and book metadata model.

use crate::config::BookFormat;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A single readable file in a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier for the book.
    pub id: String,

    /// Owning library.
    pub library_id: String,

    /// Owning series.
    pub series_id: String,

    /// File name without extension.
    pub name: String,

    /// Path to the book file.
    pub path: PathBuf,

    /// File size in bytes.
    pub file_size: u64,

    /// Last modified time of the file.
    pub modified: DateTime<Utc>,

    /// Content hash, `None` until hashed.
    pub file_hash: Option<String>,

    /// Position in series, assigned by the scanner.
    pub number: u32,

    /// Soft-delete marker.
    pub deleted_date: Option<DateTime<Utc>>,

    /// Creation time of the record.
    pub created_at: DateTime<Utc>,

    /// Last update time of the record.
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Create a new book for a file path.
    pub fn new(path: PathBuf, library_id: &str, series_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            library_id: library_id.to_string(),
            series_id: series_id.to_string(),
            name: file_stem(&path),
            path,
            file_size: 0,
            modified: now,
            file_hash: None,
            number: 0,
            deleted_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get the filename of the book.
    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    /// Format implied by the file extension.
    pub fn format(&self) -> Option<BookFormat> {
        self.extension().and_then(|e| BookFormat::from_extension(&e))
    }

    /// Whether the book has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }

    /// Whether a non-blank hash is present.
    pub fn has_hash(&self) -> bool {
        self.file_hash.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

/// Stem of a path as an owned string.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

/// Size and modification time of a file, truncated to whole seconds.
pub(crate) fn file_stat(path: &Path) -> std::io::Result<(u64, DateTime<Utc>)> {
    let metadata = std::fs::metadata(path)?;
    let secs = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((
        metadata.len(),
        DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now),
    ))
}

/// Descriptive metadata of a book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    /// Book id.
    pub book_id: String,
    /// Display title.
    pub title: String,
    /// Display number (e.g. "1", "1.5", "Annual").
    pub number: String,
    /// Numeric sort key.
    pub number_sort: f32,
    /// Summary text.
    pub summary: String,
    /// Release date.
    pub release_date: Option<NaiveDate>,
    /// Authors.
    pub authors: Vec<String>,
    /// Tags.
    pub tags: Vec<String>,
}

impl BookMetadata {
    /// Initial metadata for a freshly scanned book.
    pub fn for_book(book: &Book) -> Self {
        Self {
            book_id: book.id.clone(),
            title: book.name.clone(),
            number: book.number.to_string(),
            number_sort: book.number as f32,
            ..Default::default()
        }
    }
}
