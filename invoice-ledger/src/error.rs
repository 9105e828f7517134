//! Error types for the invoice ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Tamper detection is not an error: `verify_block` and `verify_chain`
/// report invalid blocks as ordinary results.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input field, negative amount
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invoice number already present in the chain
    #[error("Duplicate invoice: {0}")]
    DuplicateInvoice(String),

    /// Storage write or read failed (RocksDB); the append was not committed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A field could not be canonicalized for hashing
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Block not found
    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    /// Writer task is gone (mailbox or response channel closed)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
