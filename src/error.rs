//! Error types shared by the store, the controller and the exporter.

use thiserror::Error;

/// Failure inside the persistence layer.
///
/// A storage error never leaves a partially written sample behind. Apart from
/// [`StorageError::NotDurable`], the operation that raised it committed nothing.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled: {0}")]
    Db(#[from] sled::Error),
    #[error("sample record codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("corrupt store entry: {0}")]
    Corrupt(String),
    #[error("invalid sample: {0}")]
    Invalid(String),
    /// The record was committed and is visible to readers, but flushing it to disk failed.
    /// It may not survive a crash.
    #[error("{filename} committed but not flushed to disk: {source}")]
    NotDurable {
        filename: String,
        #[source]
        source: sled::Error,
    },
}

impl From<sled::transaction::TransactionError<StorageError>> for StorageError {
    fn from(err: sled::transaction::TransactionError<StorageError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(db) => StorageError::Db(db),
        }
    }
}

/// Errors surfaced to callers of the capture-session entry points.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Rejected before any state change.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("no samples stored")]
    EmptyDataset,
    /// Another batch session holds the controller.
    #[error("a capture session is already running")]
    Busy,
    #[error("failed to encode sample: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("archive build failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
