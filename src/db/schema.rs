use crate::db::timestamp_to_datetime;
use crate::error::{AppError, Result};
use crate::library::{Library, Series};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| AppError::db("Failed to open database", e))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::db("Failed to open database", e))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Run raw SQL, used by tests to inject failures.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|e| AppError::db("Failed to execute raw SQL", e))
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Libraries table
            CREATE TABLE IF NOT EXISTS libraries (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                path TEXT NOT NULL,
                repair_extensions INTEGER NOT NULL DEFAULT 0,
                convert_to_cbz INTEGER NOT NULL DEFAULT 0,
                import_local_artwork INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            -- Series table
            CREATE TABLE IF NOT EXISTS series (
                id TEXT PRIMARY KEY,
                library_id TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                deleted_date INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS series_metadata (
                series_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                title_sort TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                total_book_count INTEGER
            );

            CREATE TABLE IF NOT EXISTS book_metadata_aggregation (
                series_id TEXT PRIMARY KEY,
                authors_json TEXT NOT NULL,
                tags_json TEXT NOT NULL,
                release_date TEXT,
                summary TEXT NOT NULL DEFAULT '',
                summary_number TEXT NOT NULL DEFAULT ''
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                library_id TEXT NOT NULL,
                series_id TEXT NOT NULL,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mtime INTEGER NOT NULL DEFAULT 0,
                file_hash TEXT,
                number INTEGER NOT NULL DEFAULT 0,
                deleted_date INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Media table, one row per book
            CREATE TABLE IF NOT EXISTS media (
                book_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                media_type TEXT,
                comment TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS media_pages (
                book_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                media_type TEXT NOT NULL,
                width INTEGER,
                height INTEGER,
                PRIMARY KEY (book_id, number)
            );

            -- Thumbnails for books and series
            CREATE TABLE IF NOT EXISTS thumbnails (
                id TEXT PRIMARY KEY,
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                selected INTEGER NOT NULL DEFAULT 0,
                data BLOB,
                url TEXT,
                media_type TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS book_metadata (
                book_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                number TEXT NOT NULL,
                number_sort REAL NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                release_date TEXT,
                authors_json TEXT NOT NULL DEFAULT '[]',
                tags_json TEXT NOT NULL DEFAULT '[]'
            );

            -- Reading progress table
            CREATE TABLE IF NOT EXISTS read_progress (
                book_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                page INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (book_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS read_lists (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS read_list_books (
                read_list_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (read_list_id, book_id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_series_library ON series(library_id);
            CREATE INDEX IF NOT EXISTS idx_books_library ON books(library_id);
            CREATE INDEX IF NOT EXISTS idx_books_series ON books(series_id);
            CREATE INDEX IF NOT EXISTS idx_books_hash ON books(file_hash);
            CREATE INDEX IF NOT EXISTS idx_thumbnails_owner ON thumbnails(owner_kind, owner_id);
            CREATE INDEX IF NOT EXISTS idx_read_list_books_book ON read_list_books(book_id);
            "#,
        )
        .map_err(|e| AppError::db("Failed to initialize schema", e))?;

        Ok(())
    }

    // ========== LIBRARY OPERATIONS ==========

    /// Create library.
    pub fn create_library(&self, library: &Library) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO libraries (id, name, path, repair_extensions, convert_to_cbz, import_local_artwork, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                library.id,
                library.name,
                library.path.to_string_lossy().to_string(),
                library.repair_extensions,
                library.convert_to_cbz,
                library.import_local_artwork,
                library.created_at.timestamp(),
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::InvalidArgument(format!("Library '{}' already exists", library.name))
            } else {
                AppError::db("Failed to create library", e)
            }
        })?;
        Ok(())
    }

    /// Get library by ID.
    pub fn get_library(&self, id: &str) -> Result<Option<Library>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM libraries WHERE id = ?1", LIBRARY_COLUMNS),
            params![id],
            library_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get library", e))
    }

    /// Get library by name.
    pub fn get_library_by_name(&self, name: &str) -> Result<Option<Library>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM libraries WHERE name = ?1", LIBRARY_COLUMNS),
            params![name],
            library_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get library", e))
    }

    /// List all libraries.
    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM libraries ORDER BY name",
                LIBRARY_COLUMNS
            ))
            .map_err(|e| AppError::db("Failed to prepare query", e))?;

        let libraries = stmt
            .query_map([], library_from_row)
            .map_err(|e| AppError::db("Failed to list libraries", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect libraries", e))?;

        Ok(libraries)
    }

    /// Delete library row.
    pub fn delete_library(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM libraries WHERE id = ?1", params![id])
            .map_err(|e| AppError::db("Failed to delete library", e))?;
        Ok(rows > 0)
    }

    // ========== SERIES OPERATIONS ==========

    /// Insert series.
    pub fn insert_series(&self, series: &Series) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO series (id, library_id, name, path, deleted_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                series.id,
                series.library_id,
                series.name,
                series.path.to_string_lossy().to_string(),
                series.deleted_date.map(|d| d.timestamp()),
                series.created_at.timestamp(),
                series.updated_at.timestamp(),
            ],
        )
        .map_err(|e| AppError::db("Failed to insert series", e))?;
        Ok(())
    }

    /// Update series.
    pub fn update_series(&self, series: &Series) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE series SET name = ?2, path = ?3, deleted_date = ?4, updated_at = ?5 WHERE id = ?1",
            params![
                series.id,
                series.name,
                series.path.to_string_lossy().to_string(),
                series.deleted_date.map(|d| d.timestamp()),
                series.updated_at.timestamp(),
            ],
        )
        .map_err(|e| AppError::db("Failed to update series", e))?;
        Ok(())
    }

    /// Get series by ID.
    pub fn get_series(&self, id: &str) -> Result<Option<Series>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM series WHERE id = ?1", SERIES_COLUMNS),
            params![id],
            series_from_row,
        )
        .optional()
        .map_err(|e| AppError::db("Failed to get series", e))
    }

    /// All series of a library, soft-deleted ones included.
    pub fn get_library_series(&self, library_id: &str) -> Result<Vec<Series>> {
        self.query_series(
            &format!(
                "SELECT {} FROM series WHERE library_id = ?1 ORDER BY name",
                SERIES_COLUMNS
            ),
            library_id,
        )
    }

    /// All live series.
    pub fn get_all_series(&self) -> Result<Vec<Series>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM series WHERE deleted_date IS NULL ORDER BY name",
                SERIES_COLUMNS
            ))
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map([], series_from_row)
            .map_err(|e| AppError::db("Failed to list series", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect series", e))
    }

    fn query_series(&self, sql: &str, arg: &str) -> Result<Vec<Series>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::db("Failed to prepare query", e))?;
        stmt.query_map(params![arg], series_from_row)
            .map_err(|e| AppError::db("Failed to list series", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::db("Failed to collect series", e))
    }

    /// Delete series with their metadata and thumbnails in one transaction.
    pub fn delete_series_cascade(&self, series_ids: &[String]) -> Result<usize> {
        if series_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::db("Failed to begin transaction", e))?;

        let mut deleted = 0;
        for id in series_ids {
            tx.execute(
                "DELETE FROM series_metadata WHERE series_id = ?1",
                params![id],
            )
            .map_err(|e| AppError::db("Failed to delete series metadata", e))?;
            tx.execute(
                "DELETE FROM book_metadata_aggregation WHERE series_id = ?1",
                params![id],
            )
            .map_err(|e| AppError::db("Failed to delete series aggregation", e))?;
            tx.execute(
                "DELETE FROM thumbnails WHERE owner_kind = 'series' AND owner_id = ?1",
                params![id],
            )
            .map_err(|e| AppError::db("Failed to delete series thumbnails", e))?;
            deleted += tx
                .execute("DELETE FROM series WHERE id = ?1", params![id])
                .map_err(|e| AppError::db("Failed to delete series", e))?;
        }

        tx.commit()
            .map_err(|e| AppError::db("Failed to commit series deletion", e))?;
        Ok(deleted)
    }
}

const LIBRARY_COLUMNS: &str =
    "id, name, path, repair_extensions, convert_to_cbz, import_local_artwork, created_at";

fn library_from_row(row: &Row<'_>) -> rusqlite::Result<Library> {
    Ok(Library {
        id: row.get(0)?,
        name: row.get(1)?,
        path: PathBuf::from(row.get::<_, String>(2)?),
        repair_extensions: row.get(3)?,
        convert_to_cbz: row.get(4)?,
        import_local_artwork: row.get(5)?,
        created_at: timestamp_to_datetime(row.get(6)?),
    })
}

const SERIES_COLUMNS: &str = "id, library_id, name, path, deleted_date, created_at, updated_at";

fn series_from_row(row: &Row<'_>) -> rusqlite::Result<Series> {
    Ok(Series {
        id: row.get(0)?,
        library_id: row.get(1)?,
        name: row.get(2)?,
        path: PathBuf::from(row.get::<_, String>(3)?),
        deleted_date: row.get::<_, Option<i64>>(4)?.map(timestamp_to_datetime),
        created_at: timestamp_to_datetime(row.get(5)?),
        updated_at: timestamp_to_datetime(row.get(6)?),
    })
}
