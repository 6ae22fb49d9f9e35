//! Thumbnail selection and housekeeping.

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventSink};
use crate::library::{MarkSelected, Thumbnail, ThumbnailKind, ThumbnailOwner};
use std::sync::Arc;

/// Maintains the "at most one selected thumbnail" invariant per owner.
///
/// Housekeeping is not locked per owner: every call re-derives the
/// selection from what is stored, so concurrent calls converge.
#[derive(Clone)]
pub struct ThumbnailManager {
    db: Database,
    events: Arc<dyn EventSink>,
}

impl ThumbnailManager {
    /// Create a manager.
    pub fn new(db: Database, events: Arc<dyn EventSink>) -> Self {
        Self { db, events }
    }

    /// Store a thumbnail and apply the selection policy.
    pub fn add_thumbnail(&self, thumbnail: Thumbnail, mark: MarkSelected) -> Result<Thumbnail> {
        let owner = thumbnail.owner.clone();

        match thumbnail.kind {
            ThumbnailKind::Generated => {
                let removed = self
                    .db
                    .delete_thumbnails_by_kind(&owner, ThumbnailKind::Generated)?;
                if removed > 0 {
                    tracing::debug!(owner = %owner, removed, "Replaced generated thumbnail");
                }
            }
            ThumbnailKind::Sidecar => {
                for existing in self
                    .db
                    .find_thumbnails_by_kind(&owner, ThumbnailKind::Sidecar)?
                {
                    if existing.url == thumbnail.url {
                        self.db.delete_thumbnail(&existing.id)?;
                    }
                }
            }
            ThumbnailKind::UserUploaded => {}
        }

        let mut thumbnail = Thumbnail {
            selected: false,
            ..thumbnail
        };
        self.db.insert_thumbnail(&thumbnail)?;

        match mark {
            MarkSelected::Yes => {
                self.db.mark_thumbnail_selected(&thumbnail)?;
                thumbnail.selected = true;
            }
            MarkSelected::IfNoneOrGenerated => {
                let current = self.db.find_selected_thumbnail(&owner)?;
                if current.is_none_or(|t| t.kind == ThumbnailKind::Generated) {
                    self.db.mark_thumbnail_selected(&thumbnail)?;
                    thumbnail.selected = true;
                } else {
                    self.housekeeping(&owner)?;
                }
            }
            MarkSelected::No => self.housekeeping(&owner)?,
        }

        tracing::debug!(
            owner = %owner,
            kind = thumbnail.kind.as_str(),
            selected = thumbnail.selected,
            "Thumbnail added"
        );
        self.events
            .publish(DomainEvent::ThumbnailAdded(thumbnail.clone()));
        Ok(thumbnail)
    }

    /// Delete a user-uploaded thumbnail.
    pub fn delete_thumbnail(&self, thumbnail: &Thumbnail) -> Result<()> {
        if thumbnail.kind != ThumbnailKind::UserUploaded {
            return Err(AppError::InvalidArgument(format!(
                "Only user uploaded thumbnails can be deleted, got {}",
                thumbnail.kind.as_str()
            )));
        }

        self.db.delete_thumbnail(&thumbnail.id)?;
        self.housekeeping(&thumbnail.owner)?;
        self.events
            .publish(DomainEvent::ThumbnailDeleted(thumbnail.clone()));
        Ok(())
    }

    /// Delete every thumbnail of `kind` for an owner, without housekeeping.
    pub fn delete_thumbnails_by_kind(
        &self,
        owner: &ThumbnailOwner,
        kind: ThumbnailKind,
    ) -> Result<usize> {
        self.db.delete_thumbnails_by_kind(owner, kind)
    }

    /// Selected thumbnail of an owner, repairing the selection if needed.
    pub fn get_selected_thumbnail(&self, owner: &ThumbnailOwner) -> Result<Option<Thumbnail>> {
        if let Some(selected) = self.db.find_selected_thumbnail(owner)?
            && selected.exists()
        {
            return Ok(Some(selected));
        }

        self.housekeeping(owner)?;
        self.db.find_selected_thumbnail(owner)
    }

    /// Bytes and media type of the selected thumbnail.
    pub fn get_thumbnail_bytes(&self, owner: &ThumbnailOwner) -> Result<Option<(Vec<u8>, String)>> {
        let Some(thumbnail) = self.get_selected_thumbnail(owner)? else {
            return Ok(None);
        };
        Ok(thumbnail.bytes()?.map(|data| (data, thumbnail.media_type)))
    }

    /// Remove stale thumbnails and leave exactly one selected if any remain.
    pub fn housekeeping(&self, owner: &ThumbnailOwner) -> Result<()> {
        let (existing, stale): (Vec<_>, Vec<_>) = self
            .db
            .find_thumbnails(owner)?
            .into_iter()
            .partition(Thumbnail::exists);

        for thumbnail in &stale {
            tracing::info!(
                owner = %owner,
                thumbnail_id = %thumbnail.id,
                url = ?thumbnail.url,
                "Removing thumbnail whose file no longer exists"
            );
            self.db.delete_thumbnail(&thumbnail.id)?;
        }

        let selected: Vec<&Thumbnail> = existing.iter().filter(|t| t.selected).collect();
        match selected.as_slice() {
            [] => {
                if let Some(first) = existing.first() {
                    tracing::debug!(owner = %owner, thumbnail_id = %first.id, "Selecting first thumbnail");
                    self.db.mark_thumbnail_selected(first)?;
                }
            }
            [_] => {}
            [first, ..] => {
                tracing::debug!(
                    owner = %owner,
                    selected = selected.len(),
                    "More than one thumbnail selected, keeping the first"
                );
                self.db.mark_thumbnail_selected(first)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingEventSink;

    fn setup() -> (ThumbnailManager, Arc<RecordingEventSink>) {
        let events = Arc::new(RecordingEventSink::default());
        let manager = ThumbnailManager::new(Database::open_memory().unwrap(), events.clone());
        (manager, events)
    }

    fn owner() -> ThumbnailOwner {
        ThumbnailOwner::Book("book-1".into())
    }

    fn selected_ids(manager: &ThumbnailManager) -> Vec<String> {
        manager
            .db
            .find_thumbnails(&owner())
            .unwrap()
            .into_iter()
            .filter(|t| t.selected)
            .map(|t| t.id)
            .collect()
    }

    #[test]
    fn test_first_generated_thumbnail_is_selected() {
        let (manager, events) = setup();
        let added = manager
            .add_thumbnail(
                Thumbnail::generated(owner(), vec![1], "image/jpeg"),
                MarkSelected::IfNoneOrGenerated,
            )
            .unwrap();

        assert!(added.selected);
        assert_eq!(selected_ids(&manager), vec![added.id]);
        assert_eq!(events.count("ThumbnailAdded"), 1);
    }

    #[test]
    fn test_generated_does_not_replace_selected_upload() {
        let (manager, _) = setup();
        let upload = manager
            .add_thumbnail(
                Thumbnail::uploaded(owner(), vec![1], "image/png"),
                MarkSelected::Yes,
            )
            .unwrap();
        let generated = manager
            .add_thumbnail(
                Thumbnail::generated(owner(), vec![2], "image/jpeg"),
                MarkSelected::IfNoneOrGenerated,
            )
            .unwrap();

        assert!(!generated.selected);
        assert_eq!(selected_ids(&manager), vec![upload.id]);
    }

    #[test]
    fn test_sidecar_with_same_url_is_replaced() {
        let (manager, _) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, b"jpg").unwrap();

        manager
            .add_thumbnail(
                Thumbnail::sidecar(owner(), path.clone(), "image/jpeg"),
                MarkSelected::No,
            )
            .unwrap();
        let second = manager
            .add_thumbnail(
                Thumbnail::sidecar(owner(), path, "image/jpeg"),
                MarkSelected::No,
            )
            .unwrap();

        let all = manager.db.find_thumbnails(&owner()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, second.id);
        // Housekeeping selected the only remaining thumbnail.
        assert!(all[0].selected);
    }

    #[test]
    fn test_delete_requires_user_uploaded() {
        let (manager, events) = setup();
        let generated = manager
            .add_thumbnail(
                Thumbnail::generated(owner(), vec![1], "image/jpeg"),
                MarkSelected::No,
            )
            .unwrap();
        assert!(matches!(
            manager.delete_thumbnail(&generated),
            Err(AppError::InvalidArgument(_))
        ));

        let upload = manager
            .add_thumbnail(
                Thumbnail::uploaded(owner(), vec![2], "image/png"),
                MarkSelected::Yes,
            )
            .unwrap();
        manager.delete_thumbnail(&upload).unwrap();

        assert_eq!(events.count("ThumbnailDeleted"), 1);
        assert_eq!(selected_ids(&manager), vec![generated.id]);
    }

    #[test]
    fn test_get_selected_falls_back_when_sidecar_vanishes() {
        let (manager, _) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, b"jpg").unwrap();

        let generated = manager
            .add_thumbnail(
                Thumbnail::generated(owner(), vec![9], "image/jpeg"),
                MarkSelected::No,
            )
            .unwrap();
        manager
            .add_thumbnail(
                Thumbnail::sidecar(owner(), path.clone(), "image/jpeg"),
                MarkSelected::Yes,
            )
            .unwrap();

        std::fs::remove_file(&path).unwrap();

        let selected = manager.get_selected_thumbnail(&owner()).unwrap().unwrap();
        assert_eq!(selected.id, generated.id);
        assert_eq!(manager.db.find_thumbnails(&owner()).unwrap().len(), 1);
        assert_eq!(
            manager.get_thumbnail_bytes(&owner()).unwrap(),
            Some((vec![9], "image/jpeg".to_string()))
        );
    }

    #[test]
    fn test_housekeeping_without_thumbnails_is_noop() {
        let (manager, _) = setup();
        manager.housekeeping(&owner()).unwrap();
        assert!(manager.get_selected_thumbnail(&owner()).unwrap().is_none());
    }
}
