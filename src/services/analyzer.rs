//! Book content analysis.

use crate::error::{AppError, Result};
use crate::formats::{self, Container};
use crate::imaging::ImageConverter;
use crate::library::{Book, ImageType, Media, MediaStatus, Thumbnail, ThumbnailOwner};
use std::sync::Arc;

/// Reads book containers to produce media, pages and thumbnails.
#[derive(Clone)]
pub struct BookAnalyzer {
    images: Arc<dyn ImageConverter>,
    thumbnail_size: u32,
}

impl BookAnalyzer {
    /// Create an analyzer producing thumbnails of at most `thumbnail_size` pixels.
    pub fn new(images: Arc<dyn ImageConverter>, thumbnail_size: u32) -> Self {
        Self {
            images,
            thumbnail_size,
        }
    }

    /// Analyze a book file. Never fails: problems end up in the media status.
    pub fn analyze(&self, book: &Book) -> Media {
        let mut media = Media::unknown(&book.id);

        let container = match Container::detect(&book.path) {
            Ok(Some(container)) => container,
            Ok(None) => {
                tracing::warn!(book_id = %book.id, path = %book.path.display(), "Unknown container");
                media.status = MediaStatus::Unsupported;
                media.comment = Some("Unknown container format".to_string());
                return media;
            }
            Err(e) => {
                tracing::error!(book_id = %book.id, error = %e, "Cannot read book file");
                media.status = MediaStatus::Error;
                media.comment = Some(e.to_string());
                return media;
            }
        };

        media.media_type = Some(container.media_type().to_string());
        if !container.is_zip_family() {
            media.status = MediaStatus::Unsupported;
            media.comment = Some(format!("Unsupported container {}", container.media_type()));
            return media;
        }

        match formats::read_pages(&book.path) {
            Ok(pages) if pages.is_empty() => {
                media.status = MediaStatus::Error;
                media.comment = Some("Book has no pages".to_string());
            }
            Ok(pages) => {
                media.status = MediaStatus::Ready;
                media.pages = pages;
            }
            Err(e) => {
                tracing::error!(book_id = %book.id, error = %e, "Cannot list book pages");
                media.status = MediaStatus::Error;
                media.comment = Some(e.to_string());
            }
        }

        media
    }

    /// Raw bytes of a page (1-indexed).
    pub fn get_page_content(&self, book: &Book, media: &Media, number: u32) -> Result<Vec<u8>> {
        let page = number
            .checked_sub(1)
            .and_then(|i| media.pages.get(i as usize))
            .ok_or(AppError::PageOutOfRange {
                page: number,
                count: media.page_count(),
            })?;
        formats::read_page(&book.path, &page.file_name)
    }

    /// Render the first page as a JPEG thumbnail.
    pub fn generate_thumbnail(&self, book: &Book, media: &Media) -> Result<Thumbnail> {
        if media.status != MediaStatus::Ready {
            return Err(AppError::MediaNotReady(book.id.clone()));
        }

        let content = self.get_page_content(book, media, 1)?;
        let data = self
            .images
            .resize_image(&content, ImageType::Jpeg, self.thumbnail_size)?;

        Ok(Thumbnail::generated(
            ThumbnailOwner::Book(book.id.clone()),
            data,
            ImageType::Jpeg.media_type(),
        ))
    }
}
