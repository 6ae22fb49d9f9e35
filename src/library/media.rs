//! Media analysis results and page content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a book's media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaStatus {
    /// Never analyzed.
    Unknown,
    /// Analysis failed.
    Error,
    /// File changed since last analysis.
    Outdated,
    /// Pages are available.
    Ready,
    /// Container is not supported.
    Unsupported,
}

impl MediaStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Unknown => "UNKNOWN",
            MediaStatus::Error => "ERROR",
            MediaStatus::Outdated => "OUTDATED",
            MediaStatus::Ready => "READY",
            MediaStatus::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNKNOWN" => Ok(MediaStatus::Unknown),
            "ERROR" => Ok(MediaStatus::Error),
            "OUTDATED" => Ok(MediaStatus::Outdated),
            "READY" => Ok(MediaStatus::Ready),
            "UNSUPPORTED" => Ok(MediaStatus::Unsupported),
            other => Err(format!("unknown media status: {}", other)),
        }
    }
}

/// One page of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    /// Entry name inside the container.
    pub file_name: String,
    /// Image media type.
    pub media_type: String,
    /// Width in pixels, if known.
    pub width: Option<u32>,
    /// Height in pixels, if known.
    pub height: Option<u32>,
}

/// Media record, one per book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Book id.
    pub book_id: String,
    /// Lifecycle status.
    pub status: MediaStatus,
    /// Container media type.
    pub media_type: Option<String>,
    /// Ordered pages.
    pub pages: Vec<BookPage>,
    /// Analysis comment (error reason).
    pub comment: Option<String>,
}

impl Media {
    /// Media for a book that was never analyzed.
    pub fn unknown(book_id: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            status: MediaStatus::Unknown,
            media_type: None,
            pages: Vec::new(),
            comment: None,
        }
    }

    /// Number of pages.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }
}

/// Bytes of a single page as served to a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct BookPageContent {
    /// Page number (1-indexed).
    pub number: u32,
    /// Encoded image bytes.
    pub content: Vec<u8>,
    /// Media type of `content`.
    pub media_type: String,
}

/// Image formats a page can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
}

impl ImageType {
    /// MIME type.
    pub fn media_type(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
        }
    }

    /// Encoder format for the `image` crate.
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            ImageType::Jpeg => image::ImageFormat::Jpeg,
            ImageType::Png => image::ImageFormat::Png,
        }
    }
}

impl FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Ok(ImageType::Jpeg),
            "png" | "image/png" => Ok(ImageType::Png),
            other => Err(format!("unsupported image type: {}", other)),
        }
    }
}
