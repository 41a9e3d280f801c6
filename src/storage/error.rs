//! Storage layer error types.

use thiserror::Error;

use crate::storage::page::PageId;

/// Errors that can occur in the storage layer.
///
/// Conditions a caller is expected to handle in normal operation (a full
/// pool, an unpinnable page) are not errors; they surface as `Ok(None)` or
/// `false` from the buffer pool instead.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Page {0} does not exist on disk")]
    PageNotFound(PageId),

    #[error("Invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("Page buffer must be {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Log record of {size} bytes exceeds the {max} byte limit")]
    RecordTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
