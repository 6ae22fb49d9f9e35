//! Domain services invoked by tasks and the HTTP surface.

mod analyzer;
mod artwork;
mod books;
mod converter;
mod importer;
mod libraries;
pub mod metadata;
mod pages;
pub mod search;
mod thumbnails;

pub use analyzer::BookAnalyzer;
pub use artwork::LocalArtworkLifecycle;
pub use books::BookLifecycle;
pub use converter::{BookConverter, is_convert_candidate, is_repair_candidate};
pub use importer::{BookImporter, CopyMode};
pub use libraries::{LibraryContentLifecycle, ScanSummary};
pub use metadata::{MetadataCapability, MetadataLifecycle};
pub use pages::PageContentResolver;
pub use search::SearchIndex;
pub use thumbnails::ThumbnailManager;

use crate::config::Config;
use crate::db::Database;
use crate::events::EventSink;
use crate::hash::Hasher;
use crate::imaging::ImageConverter;
use crate::tasks::{TaskEmitter, TaskSink};
use std::sync::Arc;

/// Every service wired against one database, event sink and task sink.
#[derive(Clone)]
pub struct Services {
    /// Book container analysis.
    pub analyzer: BookAnalyzer,
    /// Thumbnail selection.
    pub thumbnails: ThumbnailManager,
    /// Page content with resize and conversion.
    pub pages: PageContentResolver,
    /// Single-book operations.
    pub books: BookLifecycle,
    /// Library scan and trash.
    pub library_content: LibraryContentLifecycle,
    /// Metadata refresh and aggregation.
    pub metadata: MetadataLifecycle,
    /// Sidecar artwork import.
    pub artwork: LocalArtworkLifecycle,
    /// Extension repair and CBZ conversion.
    pub converter: BookConverter,
    /// External file import.
    pub importer: BookImporter,
    /// Title search.
    pub search: SearchIndex,
    /// Task producer.
    pub emitter: TaskEmitter,
}

impl Services {
    /// Wire the services.
    pub fn new(
        config: &Config,
        db: Database,
        events: Arc<dyn EventSink>,
        images: Arc<dyn ImageConverter>,
        hasher: Arc<dyn Hasher>,
        sink: Arc<dyn TaskSink>,
    ) -> Self {
        let analyzer = BookAnalyzer::new(images.clone(), config.thumbnails.size);
        let thumbnails = ThumbnailManager::new(db.clone(), events.clone());
        let pages = PageContentResolver::new(db.clone(), analyzer.clone(), images);
        let books = BookLifecycle::new(
            db.clone(),
            events.clone(),
            analyzer.clone(),
            thumbnails.clone(),
            hasher,
            config.scan.file_hashing,
        );
        let library_content = LibraryContentLifecycle::new(
            db.clone(),
            events.clone(),
            books.clone(),
            config.scan.workers,
        );
        let metadata = MetadataLifecycle::new(db.clone(), events.clone());
        let artwork = LocalArtworkLifecycle::new(thumbnails.clone());
        let converter = BookConverter::new(db.clone(), events.clone(), analyzer.clone());
        let importer = BookImporter::new(db.clone(), events, books.clone());
        let search = SearchIndex::new(db.clone());
        let emitter = TaskEmitter::new(db, sink, config.scan.file_hashing);

        Self {
            analyzer,
            thumbnails,
            pages,
            books,
            library_content,
            metadata,
            artwork,
            converter,
            importer,
            search,
            emitter,
        }
    }
}
