//! In-memory frontend for testing

use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::file::File;
use crate::frontend::{Frontend, FrontendError};

#[derive(Default)]
pub struct MockFrontend {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MockFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file: &File, data: impl Into<Bytes>) {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(file.id(), data.into());
    }
}

impl Frontend for MockFrontend {
    fn deliver(&self, file: &File, sink: &mut BytesMut) -> Result<(), FrontendError> {
        let files = self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let data = files
            .get(&file.id())
            .ok_or_else(|| FrontendError::NotCached(file.id()))?;
        sink.extend_from_slice(data);
        Ok(())
    }
}
