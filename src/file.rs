//! File identity
//!
//! A cached file is identified by the SHA-1 of its contents plus a little
//! metadata, all of which travels in the request path:
//!
//! ```text
//! {sha1-hex}-{size}-{width}-{height}-{type}
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the content fingerprint in bytes (SHA-1)
pub const HASH_SIZE: usize = 20;
/// Largest size the ledger can hold (SQLite integers are signed)
pub const MAX_SIZE: u64 = i64::MAX as u64;

const ID_DELIMITER: char = '-';
const ID_COMPONENTS: usize = 5;

/// Error returned when a file id cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid file id: {0}")]
pub struct InvalidFileId(pub String);

/// Content type of a cached file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Jpg,
    Png,
    Gif,
    Wbm,
}

impl FileType {
    pub const ALL: [FileType; 4] = [FileType::Jpg, FileType::Png, FileType::Gif, FileType::Wbm];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Jpg => "jpg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Wbm => "wbm",
        }
    }

    /// MIME type used when delivering the file
    pub fn content_type(&self) -> &'static str {
        match self {
            FileType::Jpg => "image/jpeg",
            FileType::Png => "image/png",
            FileType::Gif => "image/gif",
            FileType::Wbm => "video/webm",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(FileType::Jpg),
            "png" => Ok(FileType::Png),
            "gif" => Ok(FileType::Gif),
            "wbm" | "webm" => Ok(FileType::Wbm),
            _ => Err(format!("Unknown file type: {}", s)),
        }
    }
}

/// One content item of the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub hash: [u8; HASH_SIZE],
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub kind: FileType,
    /// Last time the file was served. Epoch until the usage ledger stamps it.
    pub last_used: DateTime<Utc>,
}

impl File {
    /// Parse a file from its textual id
    pub fn from_id(id: &str) -> Result<Self, InvalidFileId> {
        let invalid = || InvalidFileId(id.to_string());

        let parts: Vec<&str> = id.split(ID_DELIMITER).collect();
        if parts.len() != ID_COMPONENTS {
            return Err(invalid());
        }

        if parts[0].len() != HASH_SIZE * 2 {
            return Err(invalid());
        }
        let mut hash = [0u8; HASH_SIZE];
        hex::decode_to_slice(parts[0], &mut hash).map_err(|_| invalid())?;

        let size = parse_decimal::<u64>(parts[1])
            .filter(|size| *size <= MAX_SIZE)
            .ok_or_else(invalid)?;
        let width = parse_decimal::<u32>(parts[2]).ok_or_else(invalid)?;
        let height = parse_decimal::<u32>(parts[3]).ok_or_else(invalid)?;
        let kind = parts[4].parse::<FileType>().map_err(|_| invalid())?;

        Ok(Self {
            hash,
            size,
            width,
            height,
            kind,
            last_used: DateTime::<Utc>::default(),
        })
    }

    /// Hex encoded content fingerprint, the ledger key
    pub fn hex_id(&self) -> String {
        hex::encode(self.hash)
    }

    /// Canonical textual id, as it appears in request paths
    pub fn id(&self) -> String {
        self.to_string()
    }

    /// Builder-style setter for `last_used`
    pub fn with_last_used(mut self, last_used: DateTime<Utc>) -> Self {
        self.last_used = last_used;
        self
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.hex_id(),
            self.size,
            self.width,
            self.height,
            self.kind
        )
    }
}

impl FromStr for File {
    type Err = InvalidFileId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        File::from_id(s)
    }
}

// `str::parse` accepts a leading '+', which is not part of the id format
fn parse_decimal<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Generates random files for load testing the ledger
#[derive(Debug, Clone)]
pub struct FileGenerator {
    pub size_min: u64,
    pub size_max: u64,
    pub resolution_min: u32,
    pub resolution_max: u32,
}

impl Default for FileGenerator {
    fn default() -> Self {
        Self {
            size_min: 1024 * 5,
            size_max: 1024 * 100,
            resolution_min: 500,
            resolution_max: 1980,
        }
    }
}

impl FileGenerator {
    /// Create a fake file with a random fingerprint, marked as used now
    pub fn new_fake(&self) -> File {
        self.new_fake_with(&mut rand::thread_rng())
    }

    pub fn new_fake_with<R: Rng>(&self, rng: &mut R) -> File {
        let (size_lo, size_hi) = ordered(self.size_min, self.size_max);
        let (res_lo, res_hi) = ordered(self.resolution_min, self.resolution_max);

        File {
            hash: rng.gen(),
            size: rng.gen_range(size_lo..=size_hi),
            width: rng.gen_range(res_lo..=res_hi),
            height: rng.gen_range(res_lo..=res_hi),
            kind: FileType::ALL[rng.gen_range(0..FileType::ALL.len())],
            last_used: Utc::now(),
        }
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-1024-800-600-jpg";

    #[test]
    fn test_parse_file_id() {
        let file = File::from_id(ID).unwrap();
        assert_eq!(file.hex_id(), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4");
        assert_eq!(file.size, 1024);
        assert_eq!(file.width, 800);
        assert_eq!(file.height, 600);
        assert_eq!(file.kind, FileType::Jpg);
        assert_eq!(file.last_used, DateTime::<Utc>::default());
        assert_eq!(file.id(), ID);
    }

    #[test]
    fn test_parse_canonicalises_hash_case() {
        let upper = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4-1024-800-600-png";
        let file: File = upper.parse().unwrap();
        assert_eq!(file.id(), upper.to_lowercase());
    }

    #[test]
    fn test_parse_largest_size() {
        let id = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-9223372036854775807-800-600-jpg";
        let file = File::from_id(id).unwrap();
        assert_eq!(file.size, MAX_SIZE);
        assert_eq!(file.id(), id);
    }

    #[test]
    fn test_parse_invalid_file_ids() {
        let cases = [
            "",
            "not-a-file-id",
            // short hash
            "e3b0c44298fc1c149afbf4c8996fb92427ae41-1024-800-600-jpg",
            // non hex hash
            "z3b0c44298fc1c149afbf4c8996fb92427ae41e4-1024-800-600-jpg",
            // signed size
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-+1024-800-600-jpg",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-1024-800-600-bmp",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-1024-800-600-jpg-extra",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-1024--600-jpg",
            // size beyond what the ledger can hold
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-9223372036854775808-800-600-jpg",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4-18446744073709551615-800-600-jpg",
        ];
        for case in cases {
            assert_eq!(File::from_id(case), Err(InvalidFileId(case.to_string())), "{}", case);
        }
    }

    #[test]
    fn test_file_type_content_type() {
        assert_eq!(FileType::Wbm.content_type(), "video/webm");
        assert_eq!("JPEG".parse::<FileType>().unwrap(), FileType::Jpg);
        assert!("tiff".parse::<FileType>().is_err());
    }

    #[test]
    fn test_generator_respects_bounds() {
        let generator = FileGenerator {
            size_min: 10,
            size_max: 20,
            resolution_min: 100,
            resolution_max: 100,
        };
        for _ in 0..50 {
            let file = generator.new_fake();
            assert!((10..=20).contains(&file.size));
            assert_eq!(file.width, 100);
            assert_eq!(file.height, 100);
            // generated ids always parse back
            assert_eq!(File::from_id(&file.id()).unwrap().hash, file.hash);
        }
    }
}
