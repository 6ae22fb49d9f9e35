use crate::db::{BookMediaSummary, Database, list_to_json, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::library::{Book, BookMetadata, Media, MediaStatus};
use rusqlite::{OptionalExtension, Row, Transaction, params};
use std::path::PathBuf;

const BOOK_COLUMNS: &str = "id, library_id, series_id, name, path, file_size, mtime, file_hash, number, deleted_date, created_at, updated_at";

pub(super) fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        library_id: row.get(1)?,
        series_id: row.get(2)?,
        name: row.get(3)?,
        path: PathBuf::from(row.get::<_, String>(4)?),
        file_size: row.get::<_, i64>(5)? as u64,
        modified: timestamp_to_datetime(row.get(6)?),
        file_hash: row.get(7)?,
        number: row.get::<_, i64>(8)? as u32,
        deleted_date: row.get::<_, Option<i64>>(9)?.map(timestamp_to_datetime),
        created_at: timestamp_to_datetime(row.get(10)?),
        updated_at: timestamp_to_datetime(row.get(11)?),
    })
}

fn insert_book(tx: &Transaction<'_>, book: &Book) -> rusqlite::Result<usize> {
    tx.execute(
        &format!(
            "INSERT INTO books ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            BOOK_COLUMNS
        ),
        params![
            book.id,
            book.library_id,
            book.series_id,
            book.name,
            book.path.to_string_lossy().to_string(),
            book.file_size as i64,
            book.modified.timestamp(),
            book.file_hash,
            book.number as i64,
            book.deleted_date.map(|d| d.timestamp()),
            book.created_at.timestamp(),
            book.updated_at.timestamp(),
        ],
    )
}

fn update_book(tx: &Transaction<'_>, book: &Book) -> rusqlite::Result<usize> {
    tx.execute(
        "UPDATE books SET library_id = ?2, series_id = ?3, name = ?4, path = ?5, file_size = ?6,
             mtime = ?7, file_hash = ?8, number = ?9, deleted_date = ?10, updated_at = ?11
         WHERE id = ?1",
        params![
            book.id,
            book.library_id,
            book.series_id,
            book.name,
            book.path.to_string_lossy().to_string(),
            book.file_size as i64,
            book.modified.timestamp(),
            book.file_hash,
            book.number as i64,
            book.deleted_date.map(|d| d.timestamp()),
            book.updated_at.timestamp(),
        ],
    )
}

impl Database {
    // ========== BOOK OPERATIONS ==========

    /// Insert new books together with their UNKNOWN media and initial metadata.
    pub fn insert_books(&self, books: &[Book]) -> Result<()> {
        if books.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;

        for book in books {
            insert_book(&tx, book).map_err(|e| AppError::db("Failed to insert book", e))?;

            let media = Media::unknown(&book.id);
            tx.execute(
                "INSERT OR REPLACE INTO media (book_id, status, media_type, comment, updated_at)
                 VALUES (?1, ?2, NULL, NULL, ?3)",
                params![media.book_id, media.status.as_str(), book.updated_at.timestamp()],
            )
            .map_err(|e| AppError::db("Failed to insert media", e))?;

            let metadata = BookMetadata::for_book(book);
            tx.execute(
                "INSERT OR REPLACE INTO book_metadata (book_id, title, number, number_sort, summary, release_date, authors_json, tags_json)
                 VALUES (?1, ?2, ?3, ?4, '', NULL, ?5, ?6)",
                params![
                    metadata.book_id,
                    metadata.title,
                    metadata.number,
                    metadata.number_sort,
                    list_to_json(&metadata.authors),
                    list_to_json(&metadata.tags),
                ],
            )
            .map_err(|e| AppError::db("Failed to insert book metadata", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::db("Failed to commit books", e))?;
        Ok(())
    }

    /// Update a single book.
    pub fn update_book(&self, book: &Book) -> Result<()> {
        self.update_books(std::slice::from_ref(book))
    }

    /// Update several books in one transaction.
    pub fn update_books(&self, books: &[Book]) -> Result<()> {
        if books.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;
        for book in books {
            update_book(&tx, book).map_err(|e| AppError::db("Failed to update book", e))?;
        }
        tx.commit()
            .map_err(|e| AppError::db("Failed to commit books", e))?;
        Ok(())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
            params![id],
            book_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get book", e))
    }

    /// Check whether a book exists.
    pub fn book_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM books WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::db("Failed to check book", e))
    }

    /// All books of a library, soft-deleted ones included.
    pub fn get_library_books(&self, library_id: &str) -> Result<Vec<Book>> {
        self.query_books(
            &format!(
                "SELECT {} FROM books WHERE library_id = ?1 ORDER BY path",
                BOOK_COLUMNS
            ),
            library_id,
        )
    }

    /// Live books of a series ordered by number.
    pub fn get_series_books(&self, series_id: &str) -> Result<Vec<Book>> {
        self.query_books(
            &format!(
                "SELECT {} FROM books WHERE series_id = ?1 AND deleted_date IS NULL ORDER BY number, name",
                BOOK_COLUMNS
            ),
            series_id,
        )
    }

    /// Live books of a library that have no content hash.
    pub fn get_library_books_without_hash(&self, library_id: &str) -> Result<Vec<Book>> {
        self.query_books(
            &format!(
                "SELECT {} FROM books
                 WHERE library_id = ?1 AND deleted_date IS NULL AND (file_hash IS NULL OR TRIM(file_hash) = '')
                 ORDER BY path",
                BOOK_COLUMNS
            ),
            library_id,
        )
    }

    /// All live books.
    pub fn get_all_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books WHERE deleted_date IS NULL ORDER BY name",
                BOOK_COLUMNS
            ))
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map([], book_from_row)
            .map_err(|e| AppError::db("Failed to list books", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect books", e))
    }

    fn query_books(&self, sql: &str, arg: &str) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map(params![arg], book_from_row)
            .map_err(|e| AppError::db("Failed to list books", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect books", e))
    }

    /// Live books of a library with their media status.
    pub fn get_library_book_media(&self, library_id: &str) -> Result<Vec<BookMediaSummary>> {
        let conn = self.conn.lock();
        let columns = BOOK_COLUMNS
            .split(", ")
            .map(|c| format!("b.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, COALESCE(m.status, 'UNKNOWN'), m.media_type
                 FROM books b LEFT JOIN media m ON m.book_id = b.id
                 WHERE b.library_id = ?1 AND b.deleted_date IS NULL
                 ORDER BY b.path",
                columns
            ))
            .map_err(|e| AppError::db("Failed to prepare query", e))?;

        stmt.query_map(params![library_id], |row| {
            let book = book_from_row(row)?;
            let status = row.get::<_, String>(12)?.parse::<MediaStatus>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, e.into())
            })?;
            Ok(BookMediaSummary {
                book,
                status,
                media_type: row.get(13)?,
            })
        })
        .map_err(|e| AppError::db("Failed to list book media", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::db("Failed to collect book media", e))
    }

    /// Count live books.
    pub fn count_books(&self) -> Result<usize> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM books WHERE deleted_date IS NULL",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c as usize)
        .map_err(|e| AppError::db("Failed to count books", e))
    }

    /// Delete books and everything they own as a single unit.
    ///
    /// Read progress, read-list membership, media and pages, thumbnails and
    /// metadata are removed along with the book rows. Any failure rolls the
    /// whole transaction back.
    pub fn delete_books_cascade(&self, book_ids: &[String]) -> Result<usize> {
        if book_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;

        let mut deleted = 0;
        for id in book_ids {
            tx.execute("DELETE FROM read_progress WHERE book_id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to delete read progress", e))?;
            tx.execute("DELETE FROM read_list_books WHERE book_id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to remove book from read lists", e))?;
            tx.execute("DELETE FROM media_pages WHERE book_id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to delete media pages", e))?;
            tx.execute("DELETE FROM media WHERE book_id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to delete media", e))?;
            tx.execute(
                "DELETE FROM thumbnails WHERE owner_kind = 'book' AND owner_id = ?1",
                params![id],
            )
            .map_err(|e| AppError::db("Failed to delete thumbnails", e))?;
            tx.execute("DELETE FROM book_metadata WHERE book_id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to delete book metadata", e))?;
            deleted += tx
                .execute("DELETE FROM books WHERE id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to delete book", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::db("Failed to commit book deletion", e))?;
        Ok(deleted)
    }
}
