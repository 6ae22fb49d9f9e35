//! Importing external files into a series folder.

use crate::config::BookFormat;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventSink};
use crate::library::book::file_stat;
use crate::library::{Book, Series};
use crate::services::BookLifecycle;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How the source file reaches the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyMode {
    /// Rename, falling back to copy and delete across file systems.
    Move,
    /// Plain copy.
    #[default]
    Copy,
    /// Hard link, falling back to copy.
    Hardlink,
}

fn transfer(source: &Path, dest: &Path, mode: CopyMode) -> Result<()> {
    match mode {
        CopyMode::Copy => {
            std::fs::copy(source, dest)?;
        }
        CopyMode::Move => {
            if let Err(e) = std::fs::rename(source, dest) {
                tracing::debug!(error = %e, "Rename failed, copying instead");
                std::fs::copy(source, dest)?;
                std::fs::remove_file(source)?;
            }
        }
        CopyMode::Hardlink => {
            if let Err(e) = std::fs::hard_link(source, dest) {
                tracing::debug!(error = %e, "Hard link failed, copying instead");
                std::fs::copy(source, dest)?;
            }
        }
    }
    Ok(())
}

/// Brings files from outside the library into a series.
#[derive(Clone)]
pub struct BookImporter {
    db: Database,
    events: Arc<dyn EventSink>,
    books: BookLifecycle,
}

impl BookImporter {
    /// Create the importer.
    pub fn new(db: Database, events: Arc<dyn EventSink>, books: BookLifecycle) -> Self {
        Self { db, events, books }
    }

    /// Import `source` into `series`, optionally replacing an existing book.
    ///
    /// `destination_name` defaults to the source file name; the source
    /// extension is appended when the name has none. Existing files are
    /// never overwritten, except the file of the book being upgraded.
    pub fn import_book(
        &self,
        source: &Path,
        series: &Series,
        mode: CopyMode,
        destination_name: Option<&str>,
        upgrade_book_id: Option<&str>,
    ) -> Result<Book> {
        if !source.is_file() {
            return Err(AppError::NotFound(format!(
                "Import source {}",
                source.display()
            )));
        }
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| BookFormat::from_extension(e).is_some())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "Unsupported file type: {}",
                    source.display()
                ))
            })?;

        let file_name = match destination_name {
            Some(name) if Path::new(name).extension().is_some() => name.to_string(),
            Some(name) => format!("{}.{}", name, extension),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(AppError::InvalidArgument(format!(
                "Invalid destination name: {:?}",
                file_name
            )));
        }
        let dest = series.path.join(&file_name);

        let upgraded = match upgrade_book_id {
            Some(id) => Some(
                self.db
                    .get_book(id)?
                    .ok_or_else(|| AppError::NotFound(format!("Book {}", id)))?,
            ),
            None => None,
        };
        let replaces_upgraded = upgraded.as_ref().is_some_and(|b| b.path == dest);
        if dest.exists() && !replaces_upgraded {
            return Err(AppError::InvalidArgument(format!(
                "Destination already exists: {}",
                dest.display()
            )));
        }

        // Stage under a hidden name so a concurrent scan does not pick up a partial file.
        let staging: PathBuf = series.path.join(format!(".{}.importing", file_name));
        if let Err(e) = transfer(source, &staging, mode) {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
        std::fs::rename(&staging, &dest)?;
        tracing::info!(
            source = %source.display(),
            dest = %dest.display(),
            mode = ?mode,
            "Imported book file"
        );

        let (file_size, modified) = file_stat(&dest)?;
        let number = self
            .db
            .get_series_books(&series.id)?
            .iter()
            .map(|b| b.number)
            .max()
            .unwrap_or(0)
            + 1;
        let book = Book {
            file_size,
            modified,
            number,
            ..Book::new(dest.clone(), &series.library_id, &series.id)
        };
        self.db.insert_books(std::slice::from_ref(&book))?;
        self.events.publish(DomainEvent::BookAdded(book.clone()));

        if let Some(old) = upgraded {
            self.db.transfer_book_references(&old.id, &book.id)?;
            if old.path != dest && old.path.is_file() {
                std::fs::remove_file(&old.path)?;
                tracing::info!(book_id = %old.id, path = %old.path.display(), "Deleted upgraded book file");
            }
            self.books.delete_one(&old)?;
            tracing::info!(old = %old.id, new = %book.id, "Upgraded book");
        }

        Ok(book)
    }
}
