//! Library content lifecycle: folder scan, trash and library removal.

use crate::config::BookFormat;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventSink};
use crate::formats::natord_compare;
use crate::library::book::file_stat;
use crate::library::{Book, Library, MediaStatus, Series};
use crate::services::BookLifecycle;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// A book file found on disk.
#[derive(Debug, Clone)]
struct ScannedFile {
    path: PathBuf,
    size: u64,
    modified: DateTime<Utc>,
}

/// What a scan changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Ids of books seen for the first time.
    pub added_books: Vec<String>,
    /// Ids of series created or restored.
    pub added_series: Vec<String>,
    /// Books whose file changed or that reappeared.
    pub updated_books: usize,
    /// Books whose file vanished.
    pub deleted_books: usize,
    /// Books left untouched.
    pub unchanged_books: usize,
}

/// Reconciles the database with the library folders.
#[derive(Clone)]
pub struct LibraryContentLifecycle {
    db: Database,
    events: Arc<dyn EventSink>,
    books: BookLifecycle,
    scan_workers: usize,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn stat(path: &Path) -> Option<ScannedFile> {
    let (size, modified) = file_stat(path).ok()?;
    Some(ScannedFile {
        path: path.to_path_buf(),
        size,
        modified,
    })
}

impl LibraryContentLifecycle {
    /// Create the lifecycle service. `scan_workers` threads stat files.
    pub fn new(
        db: Database,
        events: Arc<dyn EventSink>,
        books: BookLifecycle,
        scan_workers: usize,
    ) -> Self {
        Self {
            db,
            events,
            books,
            scan_workers: scan_workers.max(1),
        }
    }

    /// Collect supported book files under `root`, grouped by folder.
    fn collect_files(&self, root: &Path) -> Result<BTreeMap<PathBuf, Vec<ScannedFile>>> {
        let paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(BookFormat::from_extension)
                    .is_some()
            })
            .map(|e| e.into_path())
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.scan_workers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build scan pool: {}", e)))?;
        let files: Vec<ScannedFile> = pool.install(|| paths.par_iter().filter_map(|p| stat(p)).collect());

        let mut folders: BTreeMap<PathBuf, Vec<ScannedFile>> = BTreeMap::new();
        for file in files {
            if let Some(parent) = file.path.parent() {
                folders.entry(parent.to_path_buf()).or_default().push(file);
            }
        }
        for files in folders.values_mut() {
            files.sort_by(|a, b| {
                natord_compare(
                    &a.path.file_name().unwrap_or_default().to_string_lossy(),
                    &b.path.file_name().unwrap_or_default().to_string_lossy(),
                )
            });
        }
        Ok(folders)
    }

    /// Scan the library root and reconcile series and books.
    pub fn scan_root_folder(&self, library: &Library) -> Result<ScanSummary> {
        if !library.path.is_dir() {
            return Err(AppError::NotFound(format!(
                "Library root folder {}",
                library.path.display()
            )));
        }

        tracing::info!(library = %library.name, path = %library.path.display(), "Scanning library");
        let start = Instant::now();
        let folders = self.collect_files(&library.path)?;

        let mut series_by_path: HashMap<PathBuf, Series> = self
            .db
            .get_library_series(&library.id)?
            .into_iter()
            .map(|s| (s.path.clone(), s))
            .collect();
        let existing_books: HashMap<PathBuf, Book> = self
            .db
            .get_library_books(&library.id)?
            .into_iter()
            .map(|b| (b.path.clone(), b))
            .collect();

        let mut summary = ScanSummary::default();
        let mut seen_books: HashSet<String> = HashSet::new();
        let mut live_series: HashSet<String> = HashSet::new();
        let mut new_books = Vec::new();
        let mut changed_books = Vec::new();
        let mut outdated = Vec::new();
        let mut unchanged = 0;
        let now = Utc::now();

        for (folder, files) in &folders {
            let series = match series_by_path.get(folder).cloned() {
                Some(series) if series.deleted_date.is_some() => {
                    let series = Series {
                        deleted_date: None,
                        updated_at: now,
                        ..series
                    };
                    self.db.update_series(&series)?;
                    tracing::info!(series = %series.name, "Restored series");
                    summary.added_series.push(series.id.clone());
                    series_by_path.insert(folder.clone(), series.clone());
                    series
                }
                Some(series) => series,
                None => {
                    let series = Series::new(folder.clone(), &library.id);
                    self.db.insert_series(&series)?;
                    tracing::info!(series = %series.name, "Added series");
                    summary.added_series.push(series.id.clone());
                    series_by_path.insert(folder.clone(), series.clone());
                    series
                }
            };
            live_series.insert(series.id.clone());

            for (index, file) in files.iter().enumerate() {
                let number = (index + 1) as u32;
                match existing_books.get(&file.path) {
                    None => {
                        let book = Book {
                            file_size: file.size,
                            modified: file.modified,
                            number,
                            ..Book::new(file.path.clone(), &library.id, &series.id)
                        };
                        seen_books.insert(book.id.clone());
                        new_books.push(book);
                    }
                    Some(existing) => {
                        seen_books.insert(existing.id.clone());
                        let mut book = existing.clone();
                        let mut changed = false;

                        if book.is_deleted() {
                            book.deleted_date = None;
                            changed = true;
                        }
                        if book.file_size != file.size
                            || book.modified.timestamp() != file.modified.timestamp()
                        {
                            tracing::info!(book_id = %book.id, path = %file.path.display(), "Book file changed");
                            book.file_size = file.size;
                            book.modified = file.modified;
                            book.file_hash = None;
                            outdated.push(book.id.clone());
                            changed = true;
                        }
                        if book.number != number || book.series_id != series.id {
                            book.number = number;
                            book.series_id = series.id.clone();
                            changed = true;
                        }

                        if changed {
                            book.updated_at = now;
                            changed_books.push(book);
                        } else {
                            unchanged += 1;
                        }
                    }
                }
            }
        }

        self.db.insert_books(&new_books)?;
        summary.added_books = new_books.iter().map(|b| b.id.clone()).collect();
        for book in new_books {
            self.events.publish(DomainEvent::BookAdded(book));
        }

        self.db.update_books(&changed_books)?;
        self.db.set_media_status(&outdated, MediaStatus::Outdated)?;
        summary.updated_books = changed_books.len();
        for book in changed_books {
            self.events.publish(DomainEvent::BookUpdated(book));
        }

        let vanished: Vec<Book> = existing_books
            .into_values()
            .filter(|b| !b.is_deleted() && !seen_books.contains(&b.id))
            .collect();
        summary.deleted_books = vanished.len();
        self.books.soft_delete_many(&vanished)?;

        for series in series_by_path.into_values() {
            if series.deleted_date.is_none() && !live_series.contains(&series.id) {
                let series = Series {
                    deleted_date: Some(now),
                    updated_at: now,
                    ..series
                };
                self.db.update_series(&series)?;
                tracing::info!(series = %series.name, "Soft-deleted series without books");
                self.events.publish(DomainEvent::SeriesUpdated(series));
            } else if summary.added_series.contains(&series.id) {
                self.events.publish(DomainEvent::SeriesUpdated(series));
            }
        }

        summary.unchanged_books = unchanged;
        tracing::info!(
            library = %library.name,
            added = summary.added_books.len(),
            updated = summary.updated_books,
            deleted = summary.deleted_books,
            unchanged = summary.unchanged_books,
            elapsed = ?start.elapsed(),
            "Library scan complete"
        );
        Ok(summary)
    }

    /// Purge soft-deleted books and series of a library.
    pub fn empty_trash(&self, library: &Library) -> Result<usize> {
        let books: Vec<Book> = self
            .db
            .get_library_books(&library.id)?
            .into_iter()
            .filter(Book::is_deleted)
            .collect();
        self.books.delete_many(&books)?;

        let series_ids: Vec<String> = self
            .db
            .get_library_series(&library.id)?
            .into_iter()
            .filter(|s| s.deleted_date.is_some())
            .map(|s| s.id)
            .collect();
        let series = self.db.delete_series_cascade(&series_ids)?;

        tracing::info!(
            library = %library.name,
            books = books.len(),
            series,
            "Emptied trash"
        );
        Ok(books.len() + series)
    }

    /// Delete a library with all of its books and series.
    pub fn delete_library(&self, library: &Library) -> Result<()> {
        let books = self.db.get_library_books(&library.id)?;
        self.books.delete_many(&books)?;

        let series_ids: Vec<String> = self
            .db
            .get_library_series(&library.id)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.db.delete_series_cascade(&series_ids)?;
        self.db.delete_library(&library.id)?;

        tracing::info!(library = %library.name, books = books.len(), "Deleted library");
        Ok(())
    }
}
