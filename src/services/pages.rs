//! Page content with optional resize or format conversion.

use crate::db::Database;
use crate::error::{AppError, ConversionFailure, Result};
use crate::imaging::ImageConverter;
use crate::library::{Book, BookPageContent, ImageType, MediaStatus};
use crate::services::BookAnalyzer;
use std::sync::Arc;

/// Serves page bytes, negotiating resize and conversion with the image codec.
#[derive(Clone)]
pub struct PageContentResolver {
    db: Database,
    analyzer: BookAnalyzer,
    images: Arc<dyn ImageConverter>,
}

impl PageContentResolver {
    /// Create a resolver.
    pub fn new(db: Database, analyzer: BookAnalyzer, images: Arc<dyn ImageConverter>) -> Self {
        Self {
            db,
            analyzer,
            images,
        }
    }

    /// Get a page (1-indexed) of a book.
    ///
    /// `resize_to` takes precedence over `convert_to`. A resized page is
    /// always JPEG. Converting to the page's own format returns the
    /// original bytes.
    pub fn get_book_page(
        &self,
        book: &Book,
        number: u32,
        convert_to: Option<ImageType>,
        resize_to: Option<u32>,
    ) -> Result<BookPageContent> {
        let media = self
            .db
            .get_media(&book.id)?
            .ok_or_else(|| AppError::NotFound(format!("Media for book {}", book.id)))?;

        if media.status != MediaStatus::Ready {
            tracing::warn!(book_id = %book.id, status = %media.status, "Book media not ready");
            return Err(AppError::MediaNotReady(book.id.clone()));
        }

        let count = media.page_count();
        if number == 0 || number > count {
            return Err(AppError::PageOutOfRange {
                page: number,
                count,
            });
        }

        let page = &media.pages[(number - 1) as usize];
        let content = self.analyzer.get_page_content(book, &media, number)?;

        if let Some(size) = resize_to {
            let target = ImageType::Jpeg;
            let resized = self
                .images
                .resize_image(&content, target, size)
                .map_err(|e| {
                    tracing::error!(book_id = %book.id, page = number, size, error = %e, "Page resize failed");
                    ConversionFailure::Codec {
                        context: format!("Resizing page {} of book {}", number, book.id),
                        message: e.to_string(),
                    }
                })?;
            return Ok(BookPageContent {
                number,
                content: resized,
                media_type: target.media_type().to_string(),
            });
        }

        if let Some(target) = convert_to
            && page.media_type != target.media_type()
        {
            let context = format!(
                "Converting page {} of book {} from {} to {}",
                number,
                book.id,
                page.media_type,
                target.media_type()
            );

            if !self
                .images
                .supported_read_media_types()
                .contains(&page.media_type.as_str())
            {
                return Err(ConversionFailure::UnsupportedRead {
                    context,
                    media_type: page.media_type.clone(),
                }
                .into());
            }
            if !self
                .images
                .supported_write_media_types()
                .contains(&target.media_type())
            {
                return Err(ConversionFailure::UnsupportedWrite {
                    context,
                    media_type: target.media_type().to_string(),
                }
                .into());
            }

            let converted = self
                .images
                .convert_image(&content, target)
                .map_err(|e| {
                    tracing::error!(book_id = %book.id, page = number, error = %e, "Page conversion failed");
                    ConversionFailure::Codec {
                        context,
                        message: e.to_string(),
                    }
                })?;
            return Ok(BookPageContent {
                number,
                content: converted,
                media_type: target.media_type().to_string(),
            });
        }

        Ok(BookPageContent {
            number,
            content,
            media_type: page.media_type.clone(),
        })
    }
}
