use crate::db::{Database, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::library::{ReadList, ReadProgress};
use rusqlite::{Connection, OptionalExtension, Row, params};

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ReadProgress> {
    Ok(ReadProgress {
        book_id: row.get(0)?,
        user_id: row.get(1)?,
        page: row.get::<_, i64>(2)? as u32,
        completed: row.get(3)?,
        updated_at: timestamp_to_datetime(row.get(4)?),
    })
}

fn load_read_list(conn: &Connection, id: &str) -> rusqlite::Result<Option<ReadList>> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM read_lists WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(name) = name else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT book_id FROM read_list_books WHERE read_list_id = ?1 ORDER BY position",
    )?;
    let book_ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(Some(ReadList {
        id: id.to_string(),
        name,
        book_ids,
    }))
}

impl Database {
    // ========== READ PROGRESS OPERATIONS ==========

    /// Save reading progress (upsert).
    pub fn save_read_progress(&self, progress: &ReadProgress) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO read_progress (book_id, user_id, page, completed, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(book_id, user_id) DO UPDATE SET
                page = excluded.page,
                completed = excluded.completed,
                updated_at = excluded.updated_at",
            params![
                progress.book_id,
                progress.user_id,
                progress.page as i64,
                progress.completed,
                progress.updated_at.timestamp(),
            ],
        )
        .map_err(|e| AppError::db("Failed to save read progress", e))?;
        Ok(())
    }

    /// Get reading progress of a user on a book.
    pub fn get_read_progress(&self, book_id: &str, user_id: &str) -> Result<Option<ReadProgress>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT book_id, user_id, page, completed, updated_at
             FROM read_progress WHERE book_id = ?1 AND user_id = ?2",
            params![book_id, user_id],
            progress_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get read progress", e))
    }

    /// All reading progress recorded for a book.
    pub fn get_book_read_progress(&self, book_id: &str) -> Result<Vec<ReadProgress>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT book_id, user_id, page, completed, updated_at
                 FROM read_progress WHERE book_id = ?1 ORDER BY user_id",
            )
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map(params![book_id], progress_from_row)
            .map_err(|e| AppError::db("Failed to list read progress", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect read progress", e))
    }

    /// Delete reading progress of a user on a book.
    pub fn delete_read_progress(&self, book_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM read_progress WHERE book_id = ?1 AND user_id = ?2",
                params![book_id, user_id],
            )
            .map_err(|e| AppError::db("Failed to delete read progress", e))?;
        Ok(rows > 0)
    }

    /// Move every progress and read-list reference from one book to another.
    ///
    /// Existing progress on the target book wins over the source's.
    pub fn transfer_book_references(&self, from_book_id: &str, to_book_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;
        tx.execute(
            "UPDATE OR IGNORE read_progress SET book_id = ?2 WHERE book_id = ?1",
            params![from_book_id, to_book_id],
        )
        .map_err(|e| AppError::db("Failed to transfer read progress", e))?;
        tx.execute(
            "UPDATE OR IGNORE read_list_books SET book_id = ?2 WHERE book_id = ?1",
            params![from_book_id, to_book_id],
        )
        .map_err(|e| AppError::db("Failed to transfer read list entries", e))?;
        tx.commit()
            .map_err(|e| AppError::db("Failed to commit reference transfer", e))?;
        Ok(())
    }

    // ========== READ LIST OPERATIONS ==========

    /// Create a read list with its books.
    pub fn create_read_list(&self, read_list: &ReadList) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;
        tx.execute(
            "INSERT INTO read_lists (id, name) VALUES (?1, ?2)",
            params![read_list.id, read_list.name],
        )
        .map_err(|e| AppError::db("Failed to create read list", e))?;
        for (position, book_id) in read_list.book_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO read_list_books (read_list_id, book_id, position) VALUES (?1, ?2, ?3)",
                params![read_list.id, book_id, position as i64],
            )
            .map_err(|e| AppError::db("Failed to add book to read list", e))?;
        }
        tx.commit()
            .map_err(|e| AppError::db("Failed to commit read list", e))?;
        Ok(())
    }

    /// Get read list by ID.
    pub fn get_read_list(&self, id: &str) -> Result<Option<ReadList>> {
        let conn = self.conn.lock();
        load_read_list(&conn, id).map_err(|e| AppError::db("Failed to get read list", e))
    }

    /// Read lists referencing a book.
    pub fn get_read_lists_containing(&self, book_id: &str) -> Result<Vec<ReadList>> {
        let conn = self.conn.lock();
        let ids = {
            let mut stmt = conn
                .prepare("SELECT DISTINCT read_list_id FROM read_list_books WHERE book_id = ?1")
                .map_err(|e| AppError::db("Failed to prepare query", e))?;
            stmt.query_map(params![book_id], |row| row.get::<_, String>(0))
                .map_err(|e| AppError::db("Failed to list read lists", e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::db("Failed to collect read lists", e))?
        };

        let mut lists = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(list) =
                load_read_list(&conn, &id).map_err(|e| AppError::db("Failed to get read list", e))?
            {
                lists.push(list);
            }
        }
        Ok(lists)
    }
}
