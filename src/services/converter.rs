//! File extension repair and CBZ conversion.

use crate::db::{BookMediaSummary, Database};
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventSink};
use crate::formats::{self, Container};
use crate::library::book::{file_stat, file_stem};
use crate::library::{Book, MediaStatus};
use crate::services::BookAnalyzer;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

const CBZ_EXTENSION: &str = "cbz";

/// Rewrites book files in place: wrong extensions and non-CBZ archives.
#[derive(Clone)]
pub struct BookConverter {
    db: Database,
    events: Arc<dyn EventSink>,
    analyzer: BookAnalyzer,
}

fn container_of(summary: &BookMediaSummary) -> Option<Container> {
    summary
        .media_type
        .as_deref()
        .and_then(Container::from_media_type)
}

/// Whether the analyzed container disagrees with the file extension.
pub fn is_repair_candidate(summary: &BookMediaSummary) -> bool {
    let Some(container) = container_of(summary) else {
        return false;
    };
    !summary
        .book
        .extension()
        .is_some_and(|ext| container.matches_extension(&ext))
}

/// Whether the book is a READY zip-family archive that is not already a CBZ.
///
/// Books with a mismatched extension are left to extension repair.
pub fn is_convert_candidate(summary: &BookMediaSummary) -> bool {
    if summary.status != MediaStatus::Ready {
        return false;
    }
    let Some(container) = container_of(summary) else {
        return false;
    };
    let Some(ext) = summary.book.extension() else {
        return false;
    };
    container.is_zip_family() && container.matches_extension(&ext) && ext != CBZ_EXTENSION
}

fn write_verified_cbz(dest: &Path, pages: &[(String, Vec<u8>)]) -> Result<()> {
    formats::write_cbz(dest, pages)?;
    let written = formats::read_pages(dest)?.len();
    if written != pages.len() {
        return Err(AppError::Internal(format!(
            "Converted archive has {} pages, expected {}",
            written,
            pages.len()
        )));
    }
    Ok(())
}

impl BookConverter {
    /// Create the converter.
    pub fn new(db: Database, events: Arc<dyn EventSink>, analyzer: BookAnalyzer) -> Self {
        Self {
            db,
            events,
            analyzer,
        }
    }

    /// Rename a book whose content does not match its extension.
    ///
    /// Returns whether the file was renamed.
    pub fn repair_extension(&self, book: &Book) -> Result<bool> {
        let Some(container) = Container::detect(&book.path)? else {
            tracing::debug!(book_id = %book.id, "Unknown container, nothing to repair");
            return Ok(false);
        };
        if book
            .extension()
            .is_some_and(|ext| container.matches_extension(&ext))
        {
            return Ok(false);
        }

        let target = book.path.with_extension(container.canonical_extension());
        if target.exists() {
            return Err(AppError::InvalidArgument(format!(
                "Cannot repair extension, destination already exists: {}",
                target.display()
            )));
        }

        std::fs::rename(&book.path, &target)?;
        tracing::info!(
            book_id = %book.id,
            from = %book.path.display(),
            to = %target.display(),
            "Repaired book extension"
        );

        let updated = Book {
            name: file_stem(&target),
            path: target,
            updated_at: Utc::now(),
            ..book.clone()
        };
        self.db.update_book(&updated)?;
        self.events.publish(DomainEvent::BookUpdated(updated));
        Ok(true)
    }

    /// Repackage a READY zip-family book as a CBZ next to the original.
    ///
    /// The source file is removed only once the new archive holds every
    /// page. Returns whether a conversion happened.
    pub fn convert_to_cbz(&self, book: &Book) -> Result<bool> {
        let media = self
            .db
            .get_media(&book.id)?
            .ok_or_else(|| AppError::NotFound(format!("Media for book {}", book.id)))?;
        if media.status != MediaStatus::Ready {
            tracing::info!(book_id = %book.id, status = %media.status, "Book not ready, skipping conversion");
            return Ok(false);
        }
        let convertible = media
            .media_type
            .as_deref()
            .and_then(Container::from_media_type)
            .is_some_and(|c| c.is_zip_family());
        if !convertible || book.extension().as_deref() == Some(CBZ_EXTENSION) {
            tracing::info!(book_id = %book.id, media_type = ?media.media_type, "Book cannot be converted to CBZ");
            return Ok(false);
        }

        let mut pages = Vec::with_capacity(media.pages.len());
        for (index, page) in media.pages.iter().enumerate() {
            let content = self
                .analyzer
                .get_page_content(book, &media, (index + 1) as u32)?;
            pages.push((page.file_name.clone(), content));
        }

        let dest = book.path.with_extension(CBZ_EXTENSION);
        if dest.exists() {
            return Err(AppError::InvalidArgument(format!(
                "Cannot convert, destination already exists: {}",
                dest.display()
            )));
        }
        if let Err(e) = write_verified_cbz(&dest, &pages) {
            if let Err(cleanup) = std::fs::remove_file(&dest) {
                tracing::warn!(path = %dest.display(), error = %cleanup, "Failed to remove partial archive");
            }
            return Err(e);
        }

        std::fs::remove_file(&book.path)?;
        let (file_size, modified) = file_stat(&dest)?;
        tracing::info!(
            book_id = %book.id,
            from = %book.path.display(),
            to = %dest.display(),
            pages = pages.len(),
            "Converted book to CBZ"
        );

        let updated = Book {
            name: file_stem(&dest),
            path: dest,
            file_size,
            modified,
            file_hash: None,
            updated_at: Utc::now(),
            ..book.clone()
        };
        self.db.update_book(&updated)?;
        self.db
            .set_media_status(std::slice::from_ref(&updated.id), MediaStatus::Outdated)?;
        self.events.publish(DomainEvent::BookUpdated(updated));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::archive_testing::write_zip;
    use crate::imaging::ImageCrateConverter;
    use crate::imaging::testing::sample_image;
    use crate::library::{ImageType, Library, Series};
    use crate::events::TracingEventSink;

    fn setup() -> (Database, BookConverter, tempfile::TempDir, Library, Series) {
        let db = Database::open_memory().unwrap();
        let analyzer = BookAnalyzer::new(Arc::new(ImageCrateConverter), 16);
        let converter = BookConverter::new(db.clone(), Arc::new(TracingEventSink), analyzer);
        let dir = tempfile::tempdir().unwrap();
        let library = Library::new("comics", dir.path().to_path_buf());
        db.create_library(&library).unwrap();
        let series = Series::new(dir.path().to_path_buf(), &library.id);
        db.insert_series(&series).unwrap();
        (db, converter, dir, library, series)
    }

    fn summary(book: Book, status: MediaStatus, media_type: &str) -> BookMediaSummary {
        BookMediaSummary {
            book,
            status,
            media_type: Some(media_type.to_string()),
        }
    }

    #[test]
    fn test_candidates() {
        let cbr = Book::new("/lib/a.cbr".into(), "l", "s");
        let epub = Book::new("/lib/b.epub".into(), "l", "s");
        let cbz = Book::new("/lib/c.cbz".into(), "l", "s");

        assert!(is_repair_candidate(&summary(cbr.clone(), MediaStatus::Ready, "application/zip")));
        assert!(!is_repair_candidate(&summary(cbz.clone(), MediaStatus::Ready, "application/zip")));
        assert!(!is_convert_candidate(&summary(cbr, MediaStatus::Ready, "application/zip")));

        assert!(is_convert_candidate(&summary(epub.clone(), MediaStatus::Ready, "application/epub+zip")));
        assert!(!is_convert_candidate(&summary(epub, MediaStatus::Unknown, "application/epub+zip")));
        assert!(!is_convert_candidate(&summary(cbz, MediaStatus::Ready, "application/zip")));
    }

    #[test]
    fn test_repair_extension_renames_and_keeps_id() {
        let (db, converter, dir, library, series) = setup();
        let path = dir.path().join("Saga 01.cbr");
        write_zip(&path, &[("1.png", sample_image(2, 2, ImageType::Png))]);
        let book = Book::new(path.clone(), &library.id, &series.id);
        db.insert_books(std::slice::from_ref(&book)).unwrap();

        assert!(converter.repair_extension(&book).unwrap());

        let stored = db.get_book(&book.id).unwrap().unwrap();
        assert_eq!(stored.path, dir.path().join("Saga 01.cbz"));
        assert!(stored.path.is_file());
        assert!(!path.exists());

        assert!(!converter.repair_extension(&stored).unwrap());
    }

    #[test]
    fn test_convert_requires_ready_media() {
        let (db, converter, dir, library, series) = setup();
        let path = dir.path().join("book.epub");
        write_zip(&path, &[("1.png", sample_image(2, 2, ImageType::Png))]);
        let book = Book::new(path.clone(), &library.id, &series.id);
        db.insert_books(std::slice::from_ref(&book)).unwrap();

        assert!(!converter.convert_to_cbz(&book).unwrap());
        assert!(path.exists());
    }
}
