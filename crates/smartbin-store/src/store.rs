//! The [`SharedStore`] seam.

use async_trait::async_trait;
use serde_json::Value;
use smartbin_types::BinError;
use thiserror::Error;

/// Errors raised by store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The HTTP round trip failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with something that is not usable JSON.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The backend is unavailable (used by in-process backends).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for BinError {
    fn from(e: StoreError) -> Self {
        BinError::Store(e.to_string())
    }
}

/// Remote key-path store with eventual visibility to external viewers.
///
/// Paths are `/`-separated. Values are JSON scalars or flat maps; a missing
/// path reads as `None`.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError>;
}
