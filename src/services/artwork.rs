//! Sidecar artwork discovery for books and series.

use crate::error::Result;
use crate::formats::natord_compare;
use crate::library::{
    Book, ImageType, Library, MarkSelected, Series, Thumbnail, ThumbnailKind, ThumbnailOwner,
};
use crate::services::ThumbnailManager;
use std::path::{Path, PathBuf};

const ARTWORK_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tbn"];
const SERIES_ARTWORK_NAMES: &[&str] = &["cover", "default", "folder", "poster", "series"];

fn artwork_media_type(extension: &str) -> &'static str {
    match extension {
        "png" => ImageType::Png.media_type(),
        _ => ImageType::Jpeg.media_type(),
    }
}

/// Whether `stem` is `<base>` or `<base>-<digits>`, ignoring case.
fn is_book_artwork_stem(stem: &str, base: &str) -> bool {
    let stem = stem.to_lowercase();
    let base = base.to_lowercase();
    match stem.strip_prefix(&base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())),
        None => false,
    }
}

/// Image files in `folder` whose stem satisfies `matches`, naturally sorted.
fn find_artwork(folder: &Path, matches: impl Fn(&str) -> bool) -> Result<Vec<(PathBuf, &'static str)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(extension) = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
        else {
            continue;
        };
        if !ARTWORK_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }
        if path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(&matches)
        {
            found.push((path, artwork_media_type(&extension)));
        }
    }

    found.sort_by(|(a, _), (b, _)| {
        natord_compare(
            &a.file_stem().unwrap_or_default().to_string_lossy(),
            &b.file_stem().unwrap_or_default().to_string_lossy(),
        )
    });
    Ok(found)
}

/// Imports sidecar images as thumbnails.
#[derive(Clone)]
pub struct LocalArtworkLifecycle {
    thumbnails: ThumbnailManager,
}

impl LocalArtworkLifecycle {
    /// Create the lifecycle service.
    pub fn new(thumbnails: ThumbnailManager) -> Self {
        Self { thumbnails }
    }

    /// Refresh sidecar thumbnails of a book.
    pub fn refresh_book_local_artwork(&self, book: &Book, library: &Library) -> Result<usize> {
        let owner = ThumbnailOwner::Book(book.id.clone());
        if !library.import_local_artwork {
            return self.forget_sidecars(&owner);
        }
        let Some(folder) = book.path.parent() else {
            return Ok(0);
        };

        let found = find_artwork(folder, |stem| is_book_artwork_stem(stem, &book.name))?;
        tracing::info!(book_id = %book.id, found = found.len(), "Refreshing book local artwork");
        self.add_sidecars(owner, found)
    }

    /// Refresh sidecar thumbnails of a series.
    pub fn refresh_series_local_artwork(&self, series: &Series, library: &Library) -> Result<usize> {
        let owner = ThumbnailOwner::Series(series.id.clone());
        if !library.import_local_artwork {
            return self.forget_sidecars(&owner);
        }

        let found = find_artwork(&series.path, |stem| {
            SERIES_ARTWORK_NAMES
                .iter()
                .any(|name| stem.eq_ignore_ascii_case(name))
        })?;
        tracing::info!(series_id = %series.id, found = found.len(), "Refreshing series local artwork");
        self.add_sidecars(owner, found)
    }

    fn add_sidecars(
        &self,
        owner: ThumbnailOwner,
        found: Vec<(PathBuf, &'static str)>,
    ) -> Result<usize> {
        let count = found.len();
        for (index, (path, media_type)) in found.into_iter().enumerate() {
            let mark = if index == 0 {
                MarkSelected::IfNoneOrGenerated
            } else {
                MarkSelected::No
            };
            self.thumbnails
                .add_thumbnail(Thumbnail::sidecar(owner.clone(), path, media_type), mark)?;
        }
        // Sidecars removed from disk since the last refresh.
        self.thumbnails.housekeeping(&owner)?;
        Ok(count)
    }

    fn forget_sidecars(&self, owner: &ThumbnailOwner) -> Result<usize> {
        let removed = self
            .thumbnails
            .delete_thumbnails_by_kind(owner, ThumbnailKind::Sidecar)?;
        if removed > 0 {
            tracing::info!(owner = %owner, removed, "Local artwork disabled, removed sidecar thumbnails");
        }
        self.thumbnails.housekeeping(owner)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::events::testing::RecordingEventSink;
    use std::sync::Arc;

    fn setup() -> (Database, LocalArtworkLifecycle, tempfile::TempDir) {
        let db = Database::open_memory().unwrap();
        let thumbnails = ThumbnailManager::new(db.clone(), Arc::new(RecordingEventSink::default()));
        (db, LocalArtworkLifecycle::new(thumbnails), tempfile::tempdir().unwrap())
    }

    #[test]
    fn test_is_book_artwork_stem() {
        assert!(is_book_artwork_stem("Batman 01", "Batman 01"));
        assert!(is_book_artwork_stem("batman 01-2", "Batman 01"));
        assert!(!is_book_artwork_stem("Batman 01-", "Batman 01"));
        assert!(!is_book_artwork_stem("Batman 01-x", "Batman 01"));
        assert!(!is_book_artwork_stem("Batman 02", "Batman 01"));
    }

    #[test]
    fn test_book_sidecars_first_is_selected() {
        let (db, artwork, dir) = setup();
        let library = Library::new("comics", dir.path().to_path_buf());
        let book = Book::new(dir.path().join("Saga 01.cbz"), &library.id, "s");
        std::fs::write(dir.path().join("Saga 01.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("Saga 01-2.PNG"), b"b").unwrap();
        std::fs::write(dir.path().join("Saga 02.jpg"), b"c").unwrap();

        assert_eq!(artwork.refresh_book_local_artwork(&book, &library).unwrap(), 2);

        let owner = ThumbnailOwner::Book(book.id.clone());
        let all = db.find_thumbnails(&owner).unwrap();
        assert_eq!(all.len(), 2);
        let selected = db.find_selected_thumbnail(&owner).unwrap().unwrap();
        assert_eq!(selected.url, Some(dir.path().join("Saga 01.jpg")));

        // A second refresh does not duplicate records.
        artwork.refresh_book_local_artwork(&book, &library).unwrap();
        assert_eq!(db.find_thumbnails(&owner).unwrap().len(), 2);
    }

    #[test]
    fn test_series_sidecar_tbn_is_jpeg() {
        let (db, artwork, dir) = setup();
        let library = Library::new("comics", dir.path().to_path_buf());
        let series = Series::new(dir.path().to_path_buf(), &library.id);
        std::fs::write(dir.path().join("Folder.tbn"), b"x").unwrap();

        artwork.refresh_series_local_artwork(&series, &library).unwrap();

        let selected = db
            .find_selected_thumbnail(&ThumbnailOwner::Series(series.id.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(selected.media_type, "image/jpeg");
        assert_eq!(selected.kind, ThumbnailKind::Sidecar);
    }

    #[test]
    fn test_disabled_import_removes_sidecars() {
        let (db, artwork, dir) = setup();
        let mut library = Library::new("comics", dir.path().to_path_buf());
        let series = Series::new(dir.path().to_path_buf(), &library.id);
        std::fs::write(dir.path().join("cover.jpg"), b"x").unwrap();
        artwork.refresh_series_local_artwork(&series, &library).unwrap();

        library.import_local_artwork = false;
        artwork.refresh_series_local_artwork(&series, &library).unwrap();

        let owner = ThumbnailOwner::Series(series.id.clone());
        assert!(db.find_thumbnails(&owner).unwrap().is_empty());
    }
}
