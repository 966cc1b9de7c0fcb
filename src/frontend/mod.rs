//! Cached Content Delivery Abstraction
//!
//! A frontend owns the bytes of cached files. The server only asks it to
//! deliver a file once the request has been authorized.

pub mod local_store;
pub mod mock_store;

use bytes::BytesMut;

use crate::file::File;

#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    #[error("file {0} is not cached")]
    NotCached(String),
    #[error("file {id} has {actual} bytes on disk, expected {expected}")]
    SizeMismatch { id: String, expected: u64, actual: u64 },
    #[error("frontend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait defining the content delivery interface
pub trait Frontend: Send + Sync {
    /// Write the full contents of `file` into `sink`
    fn deliver(&self, file: &File, sink: &mut BytesMut) -> Result<(), FrontendError>;
}
