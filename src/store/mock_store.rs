//! In-memory implementation of the Store trait for testing

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::file::File;
use crate::store::{stored_size, truncate, Store, StoreError};

/// In-memory usage ledger
pub struct MockStore {
    data: Mutex<Option<HashMap<String, File>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Clear all records (useful for test cleanup)
    pub fn clear(&self) {
        if let Some(data) = self.lock().as_mut() {
            data.clear();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<HashMap<String, File>>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalized(file: &File) -> File {
    file.clone().with_last_used(truncate(file.last_used))
}

impl Store for MockStore {
    fn add(&self, file: &File) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let data = guard.as_mut().ok_or(StoreError::Closed)?;
        stored_size(file)?;
        data.insert(file.hex_id(), normalized(file));
        Ok(())
    }

    fn add_batch(&self, files: &[File]) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let data = guard.as_mut().ok_or(StoreError::Closed)?;
        // all or nothing, like a transaction
        for file in files {
            stored_size(file)?;
        }
        for file in files {
            data.insert(file.hex_id(), normalized(file));
        }
        Ok(())
    }

    fn use_file(&self, file: &File) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let data = guard.as_mut().ok_or(StoreError::Closed)?;
        let record = data
            .get_mut(&file.hex_id())
            .ok_or_else(|| StoreError::NotFound(file.hex_id()))?;
        let now = truncate(Utc::now());
        if now > record.last_used {
            record.last_used = now;
        }
        Ok(())
    }

    fn get(&self, hex_id: &str) -> Result<Option<File>, StoreError> {
        let guard = self.lock();
        let data = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(data.get(&hex_id.to_lowercase()).cloned())
    }

    fn count(&self) -> Result<u64, StoreError> {
        let guard = self.lock();
        let data = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(data.len() as u64)
    }

    fn collect(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut guard = self.lock();
        let data = guard.as_mut().ok_or(StoreError::Closed)?;
        let cutoff = truncate(cutoff);
        let before = data.len();
        data.retain(|_, file| file.last_used >= cutoff);
        Ok((before - data.len()) as u64)
    }

    fn close(&self) -> Result<(), StoreError> {
        self.lock().take().map(|_| ()).ok_or(StoreError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileGenerator;

    #[test]
    fn test_mock_store_basic_operations() {
        let store = MockStore::new();
        let file = FileGenerator::default().new_fake();

        assert_eq!(store.count().unwrap(), 0);
        store.add(&file).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(&file.hex_id()).unwrap().unwrap().id(), file.id());
        assert_eq!(store.get(&file.hex_id().to_uppercase()).unwrap().unwrap().hash, file.hash);

        store.clear();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_mock_store_close() {
        let store = MockStore::new();
        store.close().unwrap();
        assert!(matches!(store.close(), Err(StoreError::Closed)));
        assert!(matches!(store.count(), Err(StoreError::Closed)));
    }
}
