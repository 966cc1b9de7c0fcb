//! SQLite implementation of the Store trait

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::file::{File, FileType, HASH_SIZE};
use crate::store::{from_unix, stored_size, to_unix, Store, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY NOT NULL,
        size INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        kind TEXT NOT NULL,
        last_used INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS files_last_used ON files (last_used);
";

const INSERT_FILE: &str = "INSERT OR REPLACE INTO files (id, size, width, height, kind, last_used)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

/// SQLite backed usage ledger
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a ledger database file
    pub fn open<P: AsRef<Path>>(path: P, wal_mode: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Corrupt(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }
        info!("Opening SQLite store at {} (wal_mode: {})", path.display(), wal_mode);
        let conn = Connection::open(path)?;
        if wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }
        Self::init(conn)
    }

    /// Open a private in-memory ledger
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn insert(conn: &Connection, file: &File) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(INSERT_FILE)?;
    stmt.execute(params![
        file.hex_id(),
        stored_size(file)?,
        file.width,
        file.height,
        file.kind.as_str(),
        to_unix(file.last_used),
    ])?;
    Ok(())
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<(String, i64, u32, u32, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn decode(record: (String, i64, u32, u32, String, i64)) -> Result<File, StoreError> {
    let (id, size, width, height, kind, last_used) = record;
    let mut hash = [0u8; HASH_SIZE];
    hex::decode_to_slice(&id, &mut hash).map_err(|e| StoreError::Corrupt(format!("{}: {}", id, e)))?;
    let kind: FileType = kind.parse().map_err(StoreError::Corrupt)?;
    let size = u64::try_from(size).map_err(|_| StoreError::Corrupt(format!("{}: negative size {}", id, size)))?;
    Ok(File {
        hash,
        size,
        width,
        height,
        kind,
        last_used: from_unix(last_used),
    })
}

impl Store for SqliteStore {
    fn add(&self, file: &File) -> Result<(), StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        insert(conn, file)
    }

    fn add_batch(&self, files: &[File]) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = conn.transaction()?;
        for file in files {
            insert(&tx, file)?;
        }
        tx.commit()?;
        debug!("Committed batch of {} files", files.len());
        Ok(())
    }

    fn use_file(&self, file: &File) -> Result<(), StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let updated = conn.execute(
            "UPDATE files SET last_used = MAX(last_used, ?1) WHERE id = ?2",
            params![to_unix(Utc::now()), file.hex_id()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(file.hex_id()));
        }
        Ok(())
    }

    fn get(&self, hex_id: &str) -> Result<Option<File>, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let record = conn
            .query_row(
                "SELECT id, size, width, height, kind, last_used FROM files WHERE id = ?1",
                params![hex_id.to_lowercase()],
                row_to_file,
            )
            .optional()?;
        record.map(decode).transpose()
    }

    fn count(&self) -> Result<u64, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn collect(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let removed = conn.execute("DELETE FROM files WHERE last_used < ?1", params![to_unix(cutoff)])?;
        Ok(removed as u64)
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.lock();
        match guard.take() {
            Some(conn) => {
                conn.close().map_err(|(_, e)| StoreError::Io(e))?;
                info!("SQLite store closed");
                Ok(())
            }
            None => Err(StoreError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileGenerator;
    use chrono::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger").join("db.sqlite");
        let file = FileGenerator::default().new_fake();

        let store = SqliteStore::open(&path, true).unwrap();
        store.add(&file).unwrap();
        store.close().unwrap();

        let store = SqliteStore::open(&path, true).unwrap();
        let stored = store.get(&file.hex_id()).unwrap().unwrap();
        assert_eq!(stored.id(), file.id());
        assert_eq!(stored.last_used.timestamp(), file.last_used.timestamp());
        store.close().unwrap();
    }

    #[test]
    fn test_sqlite_batch_is_atomic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let generator = FileGenerator::default();
        let files: Vec<File> = (0..10).map(|_| generator.new_fake()).collect();
        store.add_batch(&files).unwrap();
        assert_eq!(store.count().unwrap(), 10);

        // a failing statement mid-batch rolls back the whole transaction
        {
            let guard = store.lock();
            let conn = guard.as_ref().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_gif BEFORE INSERT ON files WHEN NEW.kind = 'gif'
                 BEGIN SELECT RAISE(ABORT, 'gif rejected'); END;",
            )
            .unwrap();
        }
        let mut batch: Vec<File> = (0..5)
            .map(|_| {
                let mut file = generator.new_fake();
                file.kind = FileType::Png;
                file
            })
            .collect();
        batch[3].kind = FileType::Gif;
        assert!(matches!(store.add_batch(&batch), Err(StoreError::Io(_))));
        assert_eq!(store.count().unwrap(), 10);
        assert!(store.get(&batch[0].hex_id()).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_negative_size_is_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = FileGenerator::default().new_fake();
        store.add(&file).unwrap();
        {
            let guard = store.lock();
            let conn = guard.as_ref().unwrap();
            conn.execute("UPDATE files SET size = -1", []).unwrap();
        }
        assert!(matches!(store.get(&file.hex_id()), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_sqlite_use_never_moves_backward() {
        let store = SqliteStore::open_in_memory().unwrap();
        let future = Utc::now() + Duration::hours(1);
        let file = FileGenerator::default().new_fake().with_last_used(future);
        store.add(&file).unwrap();
        store.use_file(&file).unwrap();
        let stored = store.get(&file.hex_id()).unwrap().unwrap();
        assert_eq!(stored.last_used.timestamp(), future.timestamp());
    }
}
