//! Library domain model.

pub mod book;
pub mod media;
pub mod progress;
pub mod series;
pub mod thumbnail;

pub use book::{Book, BookMetadata};
pub use media::{BookPage, BookPageContent, ImageType, Media, MediaStatus};
pub use progress::ReadProgress;
pub use series::{BookMetadataAggregation, Library, ReadList, Series, SeriesMetadata};
pub use thumbnail::{MarkSelected, Thumbnail, ThumbnailKind, ThumbnailOwner};
