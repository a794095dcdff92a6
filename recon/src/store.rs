//! SQLite-backed persisted index of file records

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{ReconError, Result};
use crate::record::FileRecord;

/// Page size used when enumerating the whole store.
pub const DEFAULT_PAGE_SIZE: usize = 100;

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS file_records (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT NOT NULL,
        hash    TEXT NOT NULL,
        path    TEXT UNIQUE NOT NULL,
        type    TEXT,
        created TEXT NOT NULL,
        updated TEXT
    );
";

const INSERT_SQL: &str = "
    INSERT INTO file_records (name, hash, path, type, created, updated)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6);
";

const UPDATE_SQL: &str = "
    UPDATE file_records
    SET name = ?1, hash = ?2, path = ?3, type = ?4, created = ?5, updated = ?6
    WHERE id = ?7;
";

const DELETE_SQL: &str = "DELETE FROM file_records WHERE id = ?1;";

const FIND_BY_PATH_SQL: &str = "
    SELECT id, name, hash, path, type, created, updated
    FROM file_records
    WHERE path = ?1;
";

const PAGE_SQL: &str = "
    SELECT id, name, hash, path, type, created, updated
    FROM file_records
    WHERE id > ?1
    ORDER BY id
    LIMIT ?2;
";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM file_records;";

const ALL_KEYS_SQL: &str = "SELECT path FROM file_records;";

/// Persisted index reachable by point queries and paged enumeration.
///
/// The connection is shared behind a mutex, so point queries and point
/// writes from concurrent workers serialize on it. A failure to open the
/// database is fatal to the run.
pub struct IndexStore {
    conn: Mutex<Connection>,
    page_size: usize,
    path: Option<std::path::PathBuf>,
}

impl IndexStore {
    /// Open (or create) the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            ReconError::store_error(format!(
                "Failed to open database '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut store = Self::with_connection(conn)?;
        store.path = Some(path.as_ref().to_path_buf());
        Ok(store)
    }

    /// Open an index database that must already exist.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        if !path.as_ref().is_file() {
            return Err(ReconError::store_error(format!(
                "Database '{}' does not exist",
                path.as_ref().display()
            )));
        }

        Self::open(path)
    }

    /// Open a throwaway in-memory index.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ReconError::store_error(format!("Failed to open database: {}", e)))?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(CREATE_TABLE_SQL, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
            page_size: DEFAULT_PAGE_SIZE,
            path: None,
        })
    }

    /// Filesystem location of the database, if it is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a record and return its store-assigned id.
    pub fn insert(&self, record: &FileRecord) -> Result<i64> {
        let conn = self.conn();

        conn.execute(
            INSERT_SQL,
            params![
                record.name,
                record.fingerprint,
                record.key,
                record.content_type,
                record.created_at.to_rfc3339(),
                record.updated_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Overwrite the stored record with the same id. Returns whether a row
    /// was actually updated.
    pub fn update(&self, record: &FileRecord) -> Result<bool> {
        let id = record
            .id
            .ok_or_else(|| ReconError::store_error("Cannot update a record without an id"))?;

        let rows = self.conn().execute(
            UPDATE_SQL,
            params![
                record.name,
                record.fingerprint,
                record.key,
                record.content_type,
                record.created_at.to_rfc3339(),
                record.updated_at.map(|t| t.to_rfc3339()),
                id,
            ],
        )?;

        Ok(rows == 1)
    }

    /// Delete the record with the given id. Returns whether a row was
    /// actually deleted.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self.conn().execute(DELETE_SQL, params![id])?;
        Ok(rows == 1)
    }

    /// Point lookup by key.
    pub fn find_by_key(&self, key: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(FIND_BY_PATH_SQL, params![key], record_from_row)
            .optional()?;

        Ok(record)
    }

    /// Fetch up to `size` records with ids greater than `after_id`, in
    /// ascending id order.
    pub fn page(&self, after_id: i64, size: usize) -> Result<Vec<FileRecord>> {
        let conn = self.conn();
        let mut statement = conn.prepare(PAGE_SQL)?;
        let rows = statement.query_map(params![after_id, size as i64], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }

    /// Total number of records.
    pub fn count(&self) -> Result<i64> {
        let count = self.conn().query_row(COUNT_SQL, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Every key currently present in the store.
    pub fn all_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut statement = conn.prepare(ALL_KEYS_SQL)?;
        let rows = statement.query_map([], |row| row.get(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }

        Ok(keys)
    }

    /// Enumerate every record with the default page size.
    pub fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(FileRecord) -> Result<()>,
    {
        self.for_each_pages(self.page_size, f)
    }

    /// Enumerate every record in id order using keyset pagination.
    ///
    /// The cursor advances past the last row of each fetched page and the
    /// loop stops on the first short page, so the enumeration is complete
    /// for any page size and store size, and tolerates the total changing
    /// mid-iteration.
    pub fn for_each_pages<F>(&self, page_size: usize, mut f: F) -> Result<()>
    where
        F: FnMut(FileRecord) -> Result<()>,
    {
        let page_size = page_size.max(1);
        let mut after_id = 0i64;

        loop {
            let batch = self.page(after_id, page_size)?;
            let fetched = batch.len();

            for record in batch {
                if let Some(id) = record.id {
                    after_id = id;
                }
                f(record)?;
            }

            if fetched < page_size {
                break;
            }
        }

        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let created: String = row.get(5)?;
    let updated: Option<String> = row.get(6)?;

    Ok(FileRecord {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        fingerprint: row.get(2)?,
        key: row.get(3)?,
        content_type: row.get(4)?,
        created_at: parse_timestamp(&created, 5)?,
        updated_at: match updated {
            Some(text) => Some(parse_timestamp(&text, 6)?),
            None => None,
        },
    })
}

fn parse_timestamp(text: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
