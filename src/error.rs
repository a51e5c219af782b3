//! Typed errors for the seams callers are expected to branch on.
//!
//! Everything above these seams (CLI, tool handlers) uses `anyhow`.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the external key-value store.
///
/// A missing key is not an error: [`crate::store::KvStore::get`] returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store rejected command (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed store response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// `true` when retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Malformed(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, PartialEq)]
pub enum TrackerError {
    #[error("unknown domain: {0}")]
    UnknownDomain(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("hot-path events cannot go through the delayed queue")]
    HotPathForbidden,

    #[error("dispatcher not configured")]
    NotConfigured,

    #[error("dispatch transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("text analyzer unavailable: {0}")]
    Unavailable(String),
}

/// Why a stored payload could not be read as a [`crate::memory::types::Document`].
#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("payload is not valid JSON: {0}")]
    Unparseable(String),

    #[error("payload is not a JSON object")]
    NotAMapping,
}
