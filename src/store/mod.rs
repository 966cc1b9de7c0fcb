//! Usage Ledger Storage Abstraction
//!
//! Persists one record per cached file together with its last-used time.
//! The ledger drives eviction: `collect` removes every record that has not
//! been used since a cutoff.

pub mod sqlite_store;
pub mod mock_store;


use chrono::{DateTime, Utc};

use crate::file::File;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file {0} not found")]
    NotFound(String),
    #[error("store I/O error: {0}")]
    Io(#[from] rusqlite::Error),
    #[error("store record is corrupt: {0}")]
    Corrupt(String),
    #[error("store is closed")]
    Closed,
}

/// Trait defining the usage ledger interface.
///
/// Implementations serialize concurrent writers themselves.
pub trait Store: Send + Sync {
    /// Insert or replace the record keyed by the file fingerprint
    fn add(&self, file: &File) -> Result<(), StoreError>;

    /// Insert or replace many records in one transaction
    fn add_batch(&self, files: &[File]) -> Result<(), StoreError>;

    /// Mark a file as used now. Fails with `NotFound` if it was never added.
    fn use_file(&self, file: &File) -> Result<(), StoreError>;

    /// Point lookup by hex fingerprint
    fn get(&self, hex_id: &str) -> Result<Option<File>, StoreError>;

    /// Number of records
    fn count(&self) -> Result<u64, StoreError>;

    /// Delete every record last used before `cutoff`, returning how many were removed.
    ///
    /// The cutoff is truncated to whole seconds, so a record used within the
    /// same second as the cutoff survives.
    fn collect(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Release resources. Every later call fails with `Closed`.
    fn close(&self) -> Result<(), StoreError>;
}

/// Size as stored in the ledger. Sizes above `MAX_SIZE` are refused.
pub(crate) fn stored_size(file: &File) -> Result<i64, StoreError> {
    i64::try_from(file.size)
        .map_err(|_| StoreError::Corrupt(format!("size {} of {} is out of range", file.size, file.hex_id())))
}

/// The ledger keeps one-second resolution
pub(crate) fn to_unix(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub(crate) fn truncate(time: DateTime<Utc>) -> DateTime<Utc> {
    from_unix(to_unix(time))
}
