//! On-disk cache directory frontend
//!
//! Files live at `{cache_dir}/{first two hex chars}/{file id}`.

use bytes::{BufMut, BytesMut};
use log::{info, warn};
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::file::File;
use crate::frontend::{Frontend, FrontendError};

pub struct DiskFrontend {
    cache_dir: PathBuf,
}

impl DiskFrontend {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> io::Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }
        info!("Using cache directory: {}", cache_dir.display());
        Ok(Self { cache_dir })
    }

    /// Location of a file inside the cache directory
    pub fn path_for(&self, file: &File) -> PathBuf {
        let hex_id = file.hex_id();
        self.cache_dir.join(&hex_id[..2]).join(file.id())
    }

    /// Place file contents into the cache
    pub fn store(&self, file: &File, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&path)?;
        out.write_all(data)?;
        out.sync_all()
    }
}

impl Frontend for DiskFrontend {
    fn deliver(&self, file: &File, sink: &mut BytesMut) -> Result<(), FrontendError> {
        let path = self.path_for(file);
        let source = match fs::File::open(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FrontendError::NotCached(file.id()));
            }
            Err(e) => return Err(e.into()),
        };

        let actual = source.metadata()?.len();
        if actual != file.size {
            warn!("Cached copy of {} has {} bytes, expected {}", file, actual, file.size);
            return Err(FrontendError::SizeMismatch {
                id: file.id(),
                expected: file.size,
                actual,
            });
        }

        sink.reserve(actual as usize);
        let mut writer = sink.writer();
        io::copy(&mut source.take(actual), &mut writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ID: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-5-800-600-jpg";

    #[test]
    fn test_deliver_cached_file() {
        let dir = tempdir().unwrap();
        let frontend = DiskFrontend::new(dir.path().join("cache")).unwrap();
        let file = File::from_id(ID).unwrap();

        frontend.store(&file, b"hello").unwrap();
        assert_eq!(frontend.path_for(&file), dir.path().join("cache").join("e3").join(ID));

        let mut sink = BytesMut::new();
        frontend.deliver(&file, &mut sink).unwrap();
        assert_eq!(&sink[..], b"hello");
    }

    #[test]
    fn test_deliver_missing_file() {
        let dir = tempdir().unwrap();
        let frontend = DiskFrontend::new(dir.path()).unwrap();
        let file = File::from_id(ID).unwrap();

        let mut sink = BytesMut::new();
        assert!(matches!(frontend.deliver(&file, &mut sink), Err(FrontendError::NotCached(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_deliver_size_mismatch() {
        let dir = tempdir().unwrap();
        let frontend = DiskFrontend::new(dir.path()).unwrap();
        let file = File::from_id(ID).unwrap();
        frontend.store(&file, b"truncated file").unwrap();

        let mut sink = BytesMut::new();
        match frontend.deliver(&file, &mut sink) {
            Err(FrontendError::SizeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 14);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }
}
