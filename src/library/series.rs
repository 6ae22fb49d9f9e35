//! Libraries, series and read lists.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Library collection rooted at a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    /// Unique library ID.
    pub id: String,
    /// Library name.
    pub name: String,
    /// Root folder.
    pub path: PathBuf,
    /// Rename files whose extension does not match their content.
    pub repair_extensions: bool,
    /// Repackage convertible books as CBZ.
    pub convert_to_cbz: bool,
    /// Import sidecar thumbnails.
    pub import_local_artwork: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Library {
    /// Create a library with default options.
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            path,
            repair_extensions: false,
            convert_to_cbz: false,
            import_local_artwork: true,
            created_at: Utc::now(),
        }
    }
}

/// A folder of books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Unique identifier.
    pub id: String,
    /// Owning library.
    pub library_id: String,
    /// Folder name.
    pub name: String,
    /// Folder path.
    pub path: PathBuf,
    /// Soft-delete marker.
    pub deleted_date: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Series {
    /// Create a series for a folder.
    pub fn new(path: PathBuf, library_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            library_id: library_id.to_string(),
            name: path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string(),
            path,
            deleted_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Series-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Series id.
    pub series_id: String,
    /// Display title.
    pub title: String,
    /// Sort title.
    pub title_sort: String,
    /// Summary.
    pub summary: String,
    /// Expected number of books.
    pub total_book_count: Option<u32>,
}

/// Metadata computed from the books of a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadataAggregation {
    /// Series id.
    pub series_id: String,
    /// Union of book authors.
    pub authors: Vec<String>,
    /// Union of book tags.
    pub tags: Vec<String>,
    /// Earliest book release date.
    pub release_date: Option<NaiveDate>,
    /// Summary of the first book that has one.
    pub summary: String,
    /// Number of the book the summary comes from.
    pub summary_number: String,
}

/// User-curated ordered list of book ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadList {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Book ids in reading order.
    pub book_ids: Vec<String>,
}

impl ReadList {
    /// Create an empty read list.
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            book_ids: Vec::new(),
        }
    }
}
