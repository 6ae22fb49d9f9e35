use crate::db::{
    Database, date_to_string, json_to_list, list_to_json, now_timestamp, string_to_date,
};
use crate::error::{AppError, Result};
use crate::library::{
    BookMetadata, BookMetadataAggregation, BookPage, Media, MediaStatus, SeriesMetadata,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

fn load_media(conn: &Connection, book_id: &str) -> rusqlite::Result<Option<Media>> {
    let header = conn
        .query_row(
            "SELECT status, media_type, comment FROM media WHERE book_id = ?1",
            params![book_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((status, media_type, comment)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT file_name, media_type, width, height FROM media_pages
         WHERE book_id = ?1 ORDER BY number",
    )?;
    let pages = stmt
        .query_map(params![book_id], |row| {
            Ok(BookPage {
                file_name: row.get(0)?,
                media_type: row.get(1)?,
                width: row.get::<_, Option<i64>>(2)?.map(|w| w as u32),
                height: row.get::<_, Option<i64>>(3)?.map(|h| h as u32),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let status = status.parse::<MediaStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Some(Media {
        book_id: book_id.to_string(),
        status,
        media_type,
        pages,
        comment,
    }))
}

fn book_metadata_from_row(row: &Row<'_>) -> rusqlite::Result<BookMetadata> {
    Ok(BookMetadata {
        book_id: row.get(0)?,
        title: row.get(1)?,
        number: row.get(2)?,
        number_sort: row.get::<_, f64>(3)? as f32,
        summary: row.get(4)?,
        release_date: string_to_date(row.get(5)?),
        authors: json_to_list(row.get(6)?),
        tags: json_to_list(row.get(7)?),
    })
}

impl Database {
    // ========== MEDIA OPERATIONS ==========

    /// Get media of a book.
    pub fn get_media(&self, book_id: &str) -> Result<Option<Media>> {
        let conn = self.conn.lock();
        load_media(&conn, book_id).map_err(|e| AppError::db("Failed to get media", e))
    }

    /// Replace the media of a book.
    ///
    /// When the previous media had pages (READY or OUTDATED) and the page
    /// count changed, the book's read progress is deleted in the same
    /// transaction. Returns whether progress was reset.
    pub fn replace_media(&self, media: &Media) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;

        let previous =
            load_media(&tx, &media.book_id).map_err(|e| AppError::db("Failed to get media", e))?;

        let reset_progress = previous.is_some_and(|p| {
            matches!(p.status, MediaStatus::Ready | MediaStatus::Outdated)
                && p.page_count() != media.page_count()
        });

        if reset_progress {
            tx.execute(
                "DELETE FROM read_progress WHERE book_id = ?1",
                params![media.book_id],
            )
            .map_err(|e| AppError::db("Failed to reset read progress", e))?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO media (book_id, status, media_type, comment, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                media.book_id,
                media.status.as_str(),
                media.media_type,
                media.comment,
                now_timestamp(),
            ],
        )
        .map_err(|e| AppError::db("Failed to save media", e))?;

        tx.execute(
            "DELETE FROM media_pages WHERE book_id = ?1",
            params![media.book_id],
        )
        .map_err(|e| AppError::db("Failed to clear media pages", e))?;

        for (index, page) in media.pages.iter().enumerate() {
            tx.execute(
                "INSERT INTO media_pages (book_id, number, file_name, media_type, width, height)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    media.book_id,
                    (index + 1) as i64,
                    page.file_name,
                    page.media_type,
                    page.width.map(|w| w as i64),
                    page.height.map(|h| h as i64),
                ],
            )
            .map_err(|e| AppError::db("Failed to save media page", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::db("Failed to commit media", e))?;
        Ok(reset_progress)
    }

    /// Set the status of several media at once.
    pub fn set_media_status(&self, book_ids: &[String], status: MediaStatus) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;
        for id in book_ids {
            tx.execute(
                "UPDATE media SET status = ?2, updated_at = ?3 WHERE book_id = ?1",
                params![id, status.as_str(), now_timestamp()],
            )
            .map_err(|e| AppError::db("Failed to update media status", e))?;
        }
        tx.commit()
            .map_err(|e| AppError::db("Failed to commit media status", e))?;
        Ok(())
    }

    // ========== BOOK METADATA OPERATIONS ==========

    /// Get metadata of a book.
    pub fn get_book_metadata(&self, book_id: &str) -> Result<Option<BookMetadata>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT book_id, title, number, number_sort, summary, release_date, authors_json, tags_json
             FROM book_metadata WHERE book_id = ?1",
            params![book_id],
            book_metadata_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get book metadata", e))
    }

    /// Metadata of the live books of a series, ordered by number.
    pub fn get_series_book_metadata(&self, series_id: &str) -> Result<Vec<BookMetadata>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT m.book_id, m.title, m.number, m.number_sort, m.summary, m.release_date, m.authors_json, m.tags_json
                 FROM book_metadata m JOIN books b ON b.id = m.book_id
                 WHERE b.series_id = ?1 AND b.deleted_date IS NULL
                 ORDER BY m.number_sort, b.name",
            )
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map(params![series_id], book_metadata_from_row)
            .map_err(|e| AppError::db("Failed to list book metadata", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect book metadata", e))
    }

    /// Insert or replace book metadata.
    pub fn save_book_metadata(&self, metadata: &BookMetadata) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO book_metadata (book_id, title, number, number_sort, summary, release_date, authors_json, tags_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                metadata.book_id,
                metadata.title,
                metadata.number,
                metadata.number_sort as f64,
                metadata.summary,
                date_to_string(metadata.release_date),
                list_to_json(&metadata.authors),
                list_to_json(&metadata.tags),
            ],
        )
        .map_err(|e| AppError::db("Failed to save book metadata", e))?;
        Ok(())
    }

    // ========== SERIES METADATA OPERATIONS ==========

    /// Get metadata of a series.
    pub fn get_series_metadata(&self, series_id: &str) -> Result<Option<SeriesMetadata>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT series_id, title, title_sort, summary, total_book_count
             FROM series_metadata WHERE series_id = ?1",
            params![series_id],
            |row| {
                Ok(SeriesMetadata {
                    series_id: row.get(0)?,
                    title: row.get(1)?,
                    title_sort: row.get(2)?,
                    summary: row.get(3)?,
                    total_book_count: row.get::<_, Option<i64>>(4)?.map(|c| c as u32),
                })
            },
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get series metadata", e))
    }

    /// Insert or replace series metadata.
    pub fn save_series_metadata(&self, metadata: &SeriesMetadata) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO series_metadata (series_id, title, title_sort, summary, total_book_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                metadata.series_id,
                metadata.title,
                metadata.title_sort,
                metadata.summary,
                metadata.total_book_count.map(|c| c as i64),
            ],
        )
        .map_err(|e| AppError::db("Failed to save series metadata", e))?;
        Ok(())
    }

    /// Get aggregated book metadata of a series.
    pub fn get_aggregation(&self, series_id: &str) -> Result<Option<BookMetadataAggregation>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT series_id, authors_json, tags_json, release_date, summary, summary_number
             FROM book_metadata_aggregation WHERE series_id = ?1",
            params![series_id],
            |row| {
                Ok(BookMetadataAggregation {
                    series_id: row.get(0)?,
                    authors: json_to_list(row.get(1)?),
                    tags: json_to_list(row.get(2)?),
                    release_date: string_to_date(row.get(3)?),
                    summary: row.get(4)?,
                    summary_number: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get aggregation", e))
    }

    /// Insert or replace aggregated book metadata.
    pub fn save_aggregation(&self, aggregation: &BookMetadataAggregation) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO book_metadata_aggregation (series_id, authors_json, tags_json, release_date, summary, summary_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                aggregation.series_id,
                list_to_json(&aggregation.authors),
                list_to_json(&aggregation.tags),
                date_to_string(aggregation.release_date),
                aggregation.summary,
                aggregation.summary_number,
            ],
        )
        .map_err(|e| AppError::db("Failed to save aggregation", e))?;
        Ok(())
    }
}
