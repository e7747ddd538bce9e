//! Durable key/value storage the queue persists its state through.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`StorageAdapter`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading `key` failed.
    #[error("storage read failed for {key}: {reason}")]
    ReadFailed {
        /// Key being read.
        key: String,
        /// Backend error text.
        reason: String,
    },
    /// Writing `key` failed; the previous value, if any, is unchanged.
    #[error("storage write failed for {key}: {reason}")]
    WriteFailed {
        /// Key being written.
        key: String,
        /// Backend error text.
        reason: String,
    },
    /// Removing `key` failed.
    #[error("storage delete failed for {key}: {reason}")]
    DeleteFailed {
        /// Key being removed.
        key: String,
        /// Backend error text.
        reason: String,
    },
    /// The backing database could not be opened or initialised.
    #[error("storage open failed: {0}")]
    Open(#[from] rusqlite::Error),
    /// A blocking storage task panicked or was cancelled.
    #[error("storage worker join error: {0}")]
    Join(String),
}

/// Result alias for storage calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Minimal durable string-keyed store the queue persists through.
///
/// `get` reports a missing key as `Ok(None)`. `set` overwrites and is durable
/// once it resolves. `delete` is idempotent.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Returns the value under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
