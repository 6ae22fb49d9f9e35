use super::queue::TaskSink;
use super::task::Task;
use crate::db::Database;
use crate::error::Result;
use crate::library::{Book, Library, MediaStatus};
use crate::services::{CopyMode, MetadataCapability, is_convert_candidate, is_repair_candidate};
use std::path::PathBuf;
use std::sync::Arc;

/// Producer API: one method per task kind plus library-wide helpers.
#[derive(Clone)]
pub struct TaskEmitter {
    db: Database,
    sink: Arc<dyn TaskSink>,
    file_hashing: bool,
}

impl TaskEmitter {
    /// Create an emitter submitting to `sink`.
    pub fn new(db: Database, sink: Arc<dyn TaskSink>, file_hashing: bool) -> Self {
        Self {
            db,
            sink,
            file_hashing,
        }
    }

    /// Submit any task.
    pub fn submit(&self, task: Task) {
        self.sink.submit(task);
    }

    /// Scan a library folder.
    pub fn scan_library(&self, library_id: &str, priority: i32) {
        self.submit(Task::ScanLibrary {
            library_id: library_id.to_string(),
            priority,
        });
    }

    /// Purge the soft-deleted content of a library.
    pub fn empty_trash(&self, library_id: &str, priority: i32) {
        self.submit(Task::EmptyTrash {
            library_id: library_id.to_string(),
            priority,
        });
    }

    /// Analyze a book.
    pub fn analyze_book(&self, book: &Book, priority: i32) {
        self.submit(Task::AnalyzeBook {
            book_id: book.id.clone(),
            priority,
        });
    }

    /// Generate the thumbnail of a book.
    pub fn generate_book_thumbnail(&self, book: &Book, priority: i32) {
        self.submit(Task::GenerateBookThumbnail {
            book_id: book.id.clone(),
            priority,
        });
    }

    /// Refresh book metadata for the given capabilities.
    pub fn refresh_book_metadata(
        &self,
        book: &Book,
        capabilities: &[MetadataCapability],
        priority: i32,
    ) {
        self.submit(Task::RefreshBookMetadata {
            book_id: book.id.clone(),
            capabilities: capabilities.to_vec(),
            priority,
        });
    }

    /// Refresh series metadata.
    pub fn refresh_series_metadata(&self, series_id: &str, priority: i32) {
        self.submit(Task::RefreshSeriesMetadata {
            series_id: series_id.to_string(),
            priority,
        });
    }

    /// Recompute aggregated series metadata.
    pub fn aggregate_series_metadata(&self, series_id: &str, priority: i32) {
        self.submit(Task::AggregateSeriesMetadata {
            series_id: series_id.to_string(),
            priority,
        });
    }

    /// Import sidecar artwork of a book.
    pub fn refresh_book_local_artwork(&self, book_id: &str, priority: i32) {
        self.submit(Task::RefreshBookLocalArtwork {
            book_id: book_id.to_string(),
            priority,
        });
    }

    /// Import sidecar artwork of a series.
    pub fn refresh_series_local_artwork(&self, series_id: &str, priority: i32) {
        self.submit(Task::RefreshSeriesLocalArtwork {
            series_id: series_id.to_string(),
            priority,
        });
    }

    /// Import an external file into a series.
    pub fn import_book(
        &self,
        series_id: &str,
        source_file: PathBuf,
        copy_mode: CopyMode,
        destination_name: Option<String>,
        upgrade_book_id: Option<String>,
        priority: i32,
    ) {
        self.submit(Task::ImportBook {
            series_id: series_id.to_string(),
            source_file,
            copy_mode,
            destination_name,
            upgrade_book_id,
            priority,
        });
    }

    /// Repackage a book as CBZ.
    pub fn convert_book(&self, book: &Book, priority: i32) {
        self.submit(Task::ConvertBook {
            book_id: book.id.clone(),
            priority,
        });
    }

    /// Fix the extension of a book.
    pub fn repair_extension(&self, book: &Book, priority: i32) {
        self.submit(Task::RepairExtension {
            book_id: book.id.clone(),
            priority,
        });
    }

    /// Hash a book file.
    pub fn hash_book(&self, book: &Book, priority: i32) {
        self.submit(Task::HashBook {
            book_id: book.id.clone(),
            priority,
        });
    }

    /// Rebuild the search index.
    pub fn rebuild_index(&self, priority: i32) {
        self.submit(Task::RebuildIndex { priority });
    }

    /// Analyze every live book of a library whose media is UNKNOWN or OUTDATED.
    pub fn analyze_unknown_and_outdated_books(&self, library: &Library, priority: i32) -> Result<usize> {
        let books: Vec<Book> = self
            .db
            .get_library_book_media(&library.id)?
            .into_iter()
            .filter(|s| matches!(s.status, MediaStatus::Unknown | MediaStatus::Outdated))
            .map(|s| s.book)
            .collect();
        for book in &books {
            self.analyze_book(book, priority);
        }
        Ok(books.len())
    }

    /// Hash every live book without a hash. No-op when hashing is disabled.
    pub fn hash_books_without_hash(&self, library: &Library, priority: i32) -> Result<usize> {
        if !self.file_hashing {
            return Ok(0);
        }
        let books = self.db.get_library_books_without_hash(&library.id)?;
        for book in &books {
            self.hash_book(book, priority);
        }
        Ok(books.len())
    }

    /// Repair every book whose extension disagrees with its content.
    pub fn repair_extensions(&self, library: &Library, priority: i32) -> Result<usize> {
        let books: Vec<Book> = self
            .db
            .get_library_book_media(&library.id)?
            .into_iter()
            .filter(is_repair_candidate)
            .map(|s| s.book)
            .collect();
        for book in &books {
            self.repair_extension(book, priority);
        }
        Ok(books.len())
    }

    /// Convert every convertible book of a library to CBZ.
    pub fn convert_books_to_cbz(&self, library: &Library, priority: i32) -> Result<usize> {
        let books: Vec<Book> = self
            .db
            .get_library_book_media(&library.id)?
            .into_iter()
            .filter(is_convert_candidate)
            .map(|s| s.book)
            .collect();
        for book in &books {
            self.convert_book(book, priority);
        }
        Ok(books.len())
    }
}
