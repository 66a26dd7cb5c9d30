//! Error types for gatekeep-store

use thiserror::Error;

/// Errors raised by audit storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend connection could not be established
    #[error("storage connection failed: {0}")]
    Connection(String),

    /// Backend query or write failed
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Schema setup failed
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),

    /// Entry could not be (de)serialized for the backend
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A stored row could not be mapped back to an audit entry
    #[error("corrupt audit row at seq {seq}: {reason}")]
    CorruptRow { seq: u64, reason: String },

    /// The hash chain does not verify at the given sequence number
    #[error("audit chain broken at seq {seq}: expected {expected}, found {actual}")]
    ChainBroken {
        seq: u64,
        expected: String,
        actual: String,
    },
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
