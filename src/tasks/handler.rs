use super::task::{LATER, LOWEST_PRIORITY, SOONER, Task, cascade_priority};
use crate::db::Database;
use crate::error::Result;
use crate::library::{Book, Library, Series};
use crate::services::{MetadataCapability, Services};
use std::fmt;
use std::time::Instant;

/// Result of a task whose handler did not fail.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Completed,
    Missing { entity: &'static str, id: String },
}

fn missing(entity: &'static str, id: &str) -> Outcome {
    Outcome::Missing {
        entity,
        id: id.to_string(),
    }
}

/// Dispatches tasks to the domain services and enqueues their follow-ups.
///
/// A task referencing a vanished entity completes as a no-op. A failing
/// task is logged and dropped: nothing is retried.
#[derive(Clone)]
pub struct TaskHandler {
    db: Database,
    services: Services,
}

impl fmt::Debug for TaskHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandler").finish_non_exhaustive()
    }
}

impl TaskHandler {
    /// Create a handler over the given services.
    pub fn new(db: Database, services: Services) -> Self {
        Self { db, services }
    }

    /// Run one task to completion. Never fails.
    pub fn handle_task(&self, task: &Task) {
        tracing::info!(task = task.kind(), id = ?task.entity_id(), priority = task.priority(), "Executing task");
        let start = Instant::now();

        match self.execute(task) {
            Ok(Outcome::Completed) => {
                tracing::info!(task = task.kind(), id = ?task.entity_id(), elapsed = ?start.elapsed(), "Task completed");
            }
            Ok(Outcome::Missing { entity, id }) => {
                tracing::warn!(task = task.kind(), entity, id = %id, "Cannot execute task, entity not found");
            }
            Err(e) => {
                tracing::error!(task = ?task, error = %e, elapsed = ?start.elapsed(), "Task failed");
            }
        }
    }

    fn live_book(&self, id: &str) -> Result<Option<Book>> {
        Ok(self.db.get_book(id)?.filter(|b| !b.is_deleted()))
    }

    fn live_series(&self, id: &str) -> Result<Option<Series>> {
        Ok(self.db.get_series(id)?.filter(|s| s.deleted_date.is_none()))
    }

    fn library(&self, id: &str) -> Result<Option<Library>> {
        self.db.get_library(id)
    }

    fn execute(&self, task: &Task) -> Result<Outcome> {
        let services = &self.services;
        let emitter = &services.emitter;

        match task {
            Task::ScanLibrary {
                library_id,
                priority,
            } => {
                let Some(library) = self.library(library_id)? else {
                    return Ok(missing("library", library_id));
                };
                let summary = services.library_content.scan_root_folder(&library)?;

                emitter.analyze_unknown_and_outdated_books(&library, *priority)?;
                emitter.hash_books_without_hash(&library, *priority)?;
                if library.import_local_artwork {
                    for book_id in &summary.added_books {
                        emitter.refresh_book_local_artwork(book_id, *priority);
                    }
                    for series_id in &summary.added_series {
                        emitter.refresh_series_local_artwork(series_id, *priority);
                    }
                }
                if library.repair_extensions {
                    emitter.repair_extensions(&library, LOWEST_PRIORITY)?;
                }
                if library.convert_to_cbz {
                    emitter.convert_books_to_cbz(&library, LOWEST_PRIORITY)?;
                }
            }

            Task::EmptyTrash { library_id, .. } => {
                let Some(library) = self.library(library_id)? else {
                    return Ok(missing("library", library_id));
                };
                services.library_content.empty_trash(&library)?;
            }

            Task::AnalyzeBook { book_id, priority } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                if services.books.analyze_and_persist(&book)? {
                    // Finish this book before the next one is analyzed.
                    let next = cascade_priority(*priority, SOONER);
                    emitter.generate_book_thumbnail(&book, next);
                    emitter.refresh_book_metadata(&book, &MetadataCapability::ALL, next);
                }
            }

            Task::GenerateBookThumbnail { book_id, .. } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                services.books.generate_thumbnail_and_persist(&book)?;
            }

            Task::RefreshBookMetadata {
                book_id,
                capabilities,
                priority,
            } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                services.metadata.refresh_book_metadata(&book, capabilities)?;
                emitter.refresh_series_metadata(&book.series_id, cascade_priority(*priority, LATER));
            }

            Task::RefreshSeriesMetadata {
                series_id,
                priority,
            } => {
                let Some(series) = self.live_series(series_id)? else {
                    return Ok(missing("series", series_id));
                };
                services.metadata.refresh_series_metadata(&series)?;
                emitter.aggregate_series_metadata(&series.id, *priority);
            }

            Task::AggregateSeriesMetadata {
                series_id,
                priority,
            } => {
                let Some(series) = self.live_series(series_id)? else {
                    return Ok(missing("series", series_id));
                };
                services.metadata.aggregate_series_metadata(&series)?;
                // One pending rebuild covers every series refreshed by the cascade.
                emitter.rebuild_index(cascade_priority(*priority, LATER));
            }

            Task::RefreshBookLocalArtwork { book_id, .. } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                let Some(library) = self.library(&book.library_id)? else {
                    return Ok(missing("library", &book.library_id));
                };
                services.artwork.refresh_book_local_artwork(&book, &library)?;
            }

            Task::RefreshSeriesLocalArtwork { series_id, .. } => {
                let Some(series) = self.live_series(series_id)? else {
                    return Ok(missing("series", series_id));
                };
                let Some(library) = self.library(&series.library_id)? else {
                    return Ok(missing("library", &series.library_id));
                };
                services
                    .artwork
                    .refresh_series_local_artwork(&series, &library)?;
            }

            Task::ImportBook {
                series_id,
                source_file,
                copy_mode,
                destination_name,
                upgrade_book_id,
                priority,
            } => {
                let Some(series) = self.live_series(series_id)? else {
                    return Ok(missing("series", series_id));
                };
                let book = services.importer.import_book(
                    source_file,
                    &series,
                    *copy_mode,
                    destination_name.as_deref(),
                    upgrade_book_id.as_deref(),
                )?;
                emitter.analyze_book(&book, cascade_priority(*priority, SOONER));
            }

            Task::ConvertBook { book_id, .. } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                services.converter.convert_to_cbz(&book)?;
            }

            Task::RepairExtension { book_id, .. } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                services.converter.repair_extension(&book)?;
            }

            Task::HashBook { book_id, .. } => {
                let Some(book) = self.live_book(book_id)? else {
                    return Ok(missing("book", book_id));
                };
                services.books.hash_and_persist(&book)?;
            }

            Task::RebuildIndex { .. } => {
                services.search.rebuild()?;
            }
        }

        Ok(Outcome::Completed)
    }
}
