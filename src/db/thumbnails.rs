use crate::db::{Database, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::library::{Thumbnail, ThumbnailKind, ThumbnailOwner};
use rusqlite::{OptionalExtension, Row, params};
use std::path::PathBuf;

const THUMBNAIL_COLUMNS: &str =
    "id, owner_kind, owner_id, kind, selected, data, url, media_type, created_at";

fn thumbnail_from_row(row: &Row<'_>) -> rusqlite::Result<Thumbnail> {
    let owner_kind: String = row.get(1)?;
    let owner_id: String = row.get(2)?;
    let kind: String = row.get(3)?;

    let owner = ThumbnailOwner::from_parts(&owner_kind, owner_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown owner kind: {}", owner_kind).into(),
        )
    })?;
    let kind = kind.parse::<ThumbnailKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Thumbnail {
        id: row.get(0)?,
        owner,
        kind,
        selected: row.get(4)?,
        data: row.get(5)?,
        url: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
        media_type: row.get(7)?,
        created_at: timestamp_to_datetime(row.get(8)?),
    })
}

impl Database {
    // ========== THUMBNAIL OPERATIONS ==========

    /// Insert a thumbnail.
    pub fn insert_thumbnail(&self, thumbnail: &Thumbnail) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO thumbnails ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                THUMBNAIL_COLUMNS
            ),
            params![
                thumbnail.id,
                thumbnail.owner.kind_str(),
                thumbnail.owner.id(),
                thumbnail.kind.as_str(),
                thumbnail.selected,
                thumbnail.data,
                thumbnail
                    .url
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                thumbnail.media_type,
                thumbnail.created_at.timestamp(),
            ],
        )
        .map_err(|e| AppError::db("Failed to insert thumbnail", e))?;
        Ok(())
    }

    /// Get thumbnail by ID.
    pub fn get_thumbnail(&self, id: &str) -> Result<Option<Thumbnail>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM thumbnails WHERE id = ?1", THUMBNAIL_COLUMNS),
            params![id],
            thumbnail_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get thumbnail", e))
    }

    /// All thumbnails of an owner in insertion order.
    pub fn find_thumbnails(&self, owner: &ThumbnailOwner) -> Result<Vec<Thumbnail>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM thumbnails WHERE owner_kind = ?1 AND owner_id = ?2 ORDER BY rowid",
                THUMBNAIL_COLUMNS
            ))
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map(params![owner.kind_str(), owner.id()], thumbnail_from_row)
            .map_err(|e| AppError::db("Failed to list thumbnails", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect thumbnails", e))
    }

    /// Thumbnails of an owner with a given kind.
    pub fn find_thumbnails_by_kind(
        &self,
        owner: &ThumbnailOwner,
        kind: ThumbnailKind,
    ) -> Result<Vec<Thumbnail>> {
        Ok(self
            .find_thumbnails(owner)?
            .into_iter()
            .filter(|t| t.kind == kind)
            .collect())
    }

    /// First selected thumbnail of an owner.
    pub fn find_selected_thumbnail(&self, owner: &ThumbnailOwner) -> Result<Option<Thumbnail>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM thumbnails WHERE owner_kind = ?1 AND owner_id = ?2 AND selected = 1
                 ORDER BY rowid LIMIT 1",
                THUMBNAIL_COLUMNS
            ),
            params![owner.kind_str(), owner.id()],
            thumbnail_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get selected thumbnail", e))
    }

    /// Make `thumbnail` the only selected thumbnail of its owner.
    pub fn mark_thumbnail_selected(&self, thumbnail: &Thumbnail) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;
        tx.execute(
            "UPDATE thumbnails SET selected = 0 WHERE owner_kind = ?1 AND owner_id = ?2 AND id <> ?3",
            params![thumbnail.owner.kind_str(), thumbnail.owner.id(), thumbnail.id],
        )
        .map_err(|e| AppError::db("Failed to deselect thumbnails", e))?;
        tx.execute(
            "UPDATE thumbnails SET selected = 1 WHERE id = ?1",
            params![thumbnail.id],
        )
        .map_err(|e| AppError::db("Failed to select thumbnail", e))?;
        tx.commit()
            .map_err(|e| AppError::db("Failed to commit thumbnail selection", e))?;
        Ok(())
    }

    /// Delete a thumbnail.
    pub fn delete_thumbnail(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM thumbnails WHERE id = ?1", params![id])
            .map_err(|e| AppError::db("Failed to delete thumbnail", e))?;
        Ok(rows > 0)
    }

    /// Delete all thumbnails of an owner with a given kind.
    pub fn delete_thumbnails_by_kind(
        &self,
        owner: &ThumbnailOwner,
        kind: ThumbnailKind,
    ) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM thumbnails WHERE owner_kind = ?1 AND owner_id = ?2 AND kind = ?3",
            params![owner.kind_str(), owner.id(), kind.as_str()],
        )
        .map_err(|e| AppError::db("Failed to delete thumbnails", e))
    }
}
