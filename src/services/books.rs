//! Book lifecycle: analysis, hashing, thumbnails, read progress and deletion.

use crate::db::Database;
use crate::error::{AppError, ERR_FILE_NOT_ACCESSIBLE, Result};
use crate::events::{DomainEvent, EventSink};
use crate::hash::Hasher;
use crate::library::{
    Book, MarkSelected, Media, MediaStatus, ReadProgress, ThumbnailKind, ThumbnailOwner,
};
use crate::services::{BookAnalyzer, ThumbnailManager};
use chrono::Utc;
use std::sync::Arc;

/// Operations on single books invoked by tasks and API calls.
#[derive(Clone)]
pub struct BookLifecycle {
    db: Database,
    events: Arc<dyn EventSink>,
    analyzer: BookAnalyzer,
    thumbnails: ThumbnailManager,
    hasher: Arc<dyn Hasher>,
    file_hashing: bool,
}

impl BookLifecycle {
    /// Create the lifecycle service.
    pub fn new(
        db: Database,
        events: Arc<dyn EventSink>,
        analyzer: BookAnalyzer,
        thumbnails: ThumbnailManager,
        hasher: Arc<dyn Hasher>,
        file_hashing: bool,
    ) -> Self {
        Self {
            db,
            events,
            analyzer,
            thumbnails,
            hasher,
            file_hashing,
        }
    }

    fn media(&self, book: &Book) -> Result<Media> {
        self.db
            .get_media(&book.id)?
            .ok_or_else(|| AppError::NotFound(format!("Media for book {}", book.id)))
    }

    /// Analyze a book and store its media. Returns whether the media is READY.
    pub fn analyze_and_persist(&self, book: &Book) -> Result<bool> {
        tracing::info!(book_id = %book.id, path = %book.path.display(), "Analyzing book");

        let media = self.analyzer.analyze(book);
        let progress_reset = self.db.replace_media(&media)?;
        if progress_reset {
            tracing::info!(
                book_id = %book.id,
                pages = media.page_count(),
                "Page count changed, read progress removed"
            );
        }

        self.events.publish(DomainEvent::BookUpdated(book.clone()));
        Ok(media.status == MediaStatus::Ready)
    }

    /// Compute and store the file hash. No-op when disabled or already hashed.
    pub fn hash_and_persist(&self, book: &Book) -> Result<bool> {
        if !self.file_hashing {
            tracing::info!(book_id = %book.id, "File hashing is disabled, skipping");
            return Ok(false);
        }
        if book.has_hash() {
            tracing::debug!(book_id = %book.id, "Book already hashed");
            return Ok(false);
        }

        let hash = self.hasher.compute_hash(&book.path)?;
        let updated = Book {
            file_hash: Some(hash),
            updated_at: Utc::now(),
            ..book.clone()
        };
        self.db.update_book(&updated)?;
        self.events.publish(DomainEvent::BookUpdated(updated));
        Ok(true)
    }

    /// Generate the first-page thumbnail and add it to the book.
    pub fn generate_thumbnail_and_persist(&self, book: &Book) -> Result<()> {
        tracing::info!(book_id = %book.id, "Generating thumbnail");
        let media = self.media(book)?;
        let thumbnail = self.analyzer.generate_thumbnail(book, &media)?;
        self.thumbnails
            .add_thumbnail(thumbnail, MarkSelected::IfNoneOrGenerated)?;
        Ok(())
    }

    /// Thumbnail bytes of a book, if it has one.
    pub fn get_thumbnail_bytes(&self, book: &Book) -> Result<Option<(Vec<u8>, String)>> {
        self.thumbnails
            .get_thumbnail_bytes(&ThumbnailOwner::Book(book.id.clone()))
    }

    /// Record that `user_id` read `book` up to `page`.
    pub fn mark_read_progress(&self, book: &Book, user_id: &str, page: u32) -> Result<ReadProgress> {
        let count = self.media(book)?.page_count();
        if page == 0 || page > count {
            return Err(AppError::PageOutOfRange { page, count });
        }

        let progress = ReadProgress::at_page(&book.id, user_id, page, count);
        self.db.save_read_progress(&progress)?;
        self.events
            .publish(DomainEvent::ReadProgressChanged(progress.clone()));
        Ok(progress)
    }

    /// Mark a book as fully read.
    pub fn mark_read_progress_completed(&self, book: &Book, user_id: &str) -> Result<ReadProgress> {
        let count = self.media(book)?.page_count();
        let progress = ReadProgress {
            completed: true,
            ..ReadProgress::at_page(&book.id, user_id, count, count)
        };
        self.db.save_read_progress(&progress)?;
        self.events
            .publish(DomainEvent::ReadProgressChanged(progress.clone()));
        Ok(progress)
    }

    /// Remove the read progress of a user on a book.
    pub fn delete_read_progress(&self, book: &Book, user_id: &str) -> Result<()> {
        if let Some(progress) = self.db.get_read_progress(&book.id, user_id)? {
            self.db.delete_read_progress(&book.id, user_id)?;
            self.events
                .publish(DomainEvent::ReadProgressDeleted(progress));
        }
        Ok(())
    }

    /// Purge a book and everything it owns.
    pub fn delete_one(&self, book: &Book) -> Result<()> {
        self.delete_many(std::slice::from_ref(book))
    }

    /// Purge books and everything they own in one transaction.
    pub fn delete_many(&self, books: &[Book]) -> Result<()> {
        if books.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = books.iter().map(|b| b.id.clone()).collect();
        let deleted = self.db.delete_books_cascade(&ids)?;
        tracing::info!(books = deleted, "Deleted books");

        for book in books {
            self.events.publish(DomainEvent::BookDeleted(book.clone()));
        }
        Ok(())
    }

    /// Mark books as deleted without purging them.
    pub fn soft_delete_many(&self, books: &[Book]) -> Result<()> {
        if books.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let deleted: Vec<Book> = books
            .iter()
            .map(|b| Book {
                deleted_date: Some(now),
                updated_at: now,
                ..b.clone()
            })
            .collect();
        self.db.update_books(&deleted)?;
        tracing::info!(books = deleted.len(), "Soft-deleted books");

        for book in deleted {
            self.events.publish(DomainEvent::BookUpdated(book));
        }
        Ok(())
    }

    /// Delete a book's file, its sidecar thumbnails, and its folder if left empty.
    ///
    /// Fails with `ERR_1018` before touching anything when the file is
    /// missing or read-only. Sidecars are removed after the book, and only
    /// when writable; a sidecar that cannot be removed is left behind.
    pub fn delete_book_files(&self, book: &Book) -> Result<()> {
        let writable = std::fs::metadata(&book.path)
            .map(|m| m.is_file() && !m.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            return Err(AppError::FileAccess {
                code: ERR_FILE_NOT_ACCESSIBLE,
                path: book.path.clone(),
            });
        }

        let sidecars = self
            .db
            .find_thumbnails_by_kind(&ThumbnailOwner::Book(book.id.clone()), ThumbnailKind::Sidecar)?;

        std::fs::remove_file(&book.path)?;
        tracing::info!(book_id = %book.id, path = %book.path.display(), "Deleted book file");

        for url in sidecars.into_iter().filter_map(|t| t.url) {
            let writable = std::fs::metadata(&url)
                .map(|m| m.is_file() && !m.permissions().readonly())
                .unwrap_or(false);
            if !writable {
                tracing::debug!(book_id = %book.id, path = %url.display(), "Sidecar thumbnail missing or read-only, keeping it");
                continue;
            }
            match std::fs::remove_file(&url) {
                Ok(()) => {
                    tracing::info!(book_id = %book.id, path = %url.display(), "Deleted sidecar thumbnail")
                }
                Err(e) => {
                    tracing::warn!(book_id = %book.id, path = %url.display(), error = %e, "Could not delete sidecar thumbnail")
                }
            }
        }

        if let Some(parent) = book.path.parent()
            && std::fs::read_dir(parent)?.next().is_none()
        {
            std::fs::remove_dir(parent)?;
            tracing::info!(path = %parent.display(), "Deleted empty folder");
        }

        Ok(())
    }
}
