//! Keystamp authentication for file requests

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use std::fmt;

use crate::args::Args;
use crate::file::File;

pub const ARGS_KEYSTAMP: &str = "keystamp";
pub const KEYSTAMP_DELIMITER: char = '-';
/// Maximum allowed distance between request timestamp and server clock
pub const TIMESTAMP_MAX_DELTA: u64 = 60;
/// Number of hex characters of the digest kept in a stamp
pub const STAMP_LENGTH: usize = 10;

const STAMP_SALT: &str = "hotlinkthis";

/// Shared secrets of this node
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_id: u32,
    pub key: String,
    /// Extra secret required by the protected proxy modes
    #[serde(default)]
    pub passkey: Option<String>,
}

impl Credentials {
    pub fn new(client_id: u32, key: impl Into<String>) -> Self {
        Self {
            client_id,
            key: key.into(),
            passkey: None,
        }
    }

    pub fn with_passkey(mut self, passkey: impl Into<String>) -> Self {
        self.passkey = Some(passkey.into());
        self
    }

    /// Check a presented proxy passkey. Always false when none is configured.
    pub fn check_passkey(&self, presented: Option<&str>) -> bool {
        match (self.passkey.as_deref(), presented) {
            (Some(expected), Some(presented)) if !expected.is_empty() => {
                bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("key", &"[REDACTED]")
            .field("passkey", &self.passkey.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Reasons a file request is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("bad file id")]
    InvalidFileId,
    #[error("bad stamp format")]
    BadStampFormat,
    #[error("bad timestamp")]
    BadTimestamp,
    #[error("timestamp delta is too big")]
    ExpiredRequest,
    #[error("bad keystamp")]
    Forbidden,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(format!("{}: {}", status.as_u16(), self))
    }
}

/// Compute the stamp binding a file, the shared key and a timestamp.
///
/// `SHA1("{timestamp}-{file id}-{key}-hotlinkthis")`, lower hex, first 10 characters.
pub fn stamp(file: &File, key: &str, timestamp: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{}-{}-{}-{}", timestamp, file, key, STAMP_SALT).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(STAMP_LENGTH);
    digest
}

/// Full `keystamp` argument value for a file at a timestamp
pub fn keystamp(file: &File, key: &str, timestamp: i64) -> String {
    format!("{}{}{}", timestamp, KEYSTAMP_DELIMITER, stamp(file, key, timestamp))
}

fn split_keystamp(value: &str) -> Result<(&str, &str), AuthError> {
    let parts: Vec<&str> = value.split(KEYSTAMP_DELIMITER).collect();
    match parts.as_slice() {
        [timestamp, stamp] if !timestamp.is_empty() && !stamp.is_empty() => Ok((timestamp, stamp)),
        _ => Err(AuthError::BadStampFormat),
    }
}

/// Validate a signed file request.
///
/// `now` is the server clock in unix seconds. Nothing is enqueued here, see
/// `Server::authorize` for the full gate.
pub fn authorize(
    credentials: &Credentials,
    file_id: &str,
    args: &str,
    now: i64,
) -> Result<File, AuthError> {
    let file = File::from_id(file_id).map_err(|e| {
        warn!("Rejecting request: {}", e);
        AuthError::InvalidFileId
    })?;

    let args = Args::parse(args);
    let (timestamp, presented) = split_keystamp(args.get(ARGS_KEYSTAMP).unwrap_or_default())
        .map_err(|e| {
            warn!("Rejecting request for {}: {}", file, e);
            e
        })?;

    let timestamp: i64 = timestamp.parse().map_err(|_| {
        warn!("Rejecting request for {}: bad timestamp {:?}", file, timestamp);
        AuthError::BadTimestamp
    })?;

    let delta = now.abs_diff(timestamp);
    if delta > TIMESTAMP_MAX_DELTA {
        warn!("Rejecting request for {}: timestamp delta {}s", file, delta);
        return Err(AuthError::ExpiredRequest);
    }

    let expected = stamp(&file, &credentials.key, timestamp);
    if !bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
        warn!("Rejecting request for {}: keystamp mismatch", file);
        return Err(AuthError::Forbidden);
    }

    debug!("Authorized request for {}", file);
    Ok(file)
}
