use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failure taxonomy for the ledger cache.
///
/// Validation and insufficient-funds checks resolve locally without
/// contacting the authority. Network and remote failures are surfaced as
/// typed variants so callers can distinguish "nothing happened" from
/// "the authority committed but the cache did not".
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("account not found")]
    AccountNotFound,
    #[error("transfer rejected by authority: {0}")]
    RemoteRejected(String),
    #[error("authority unreachable: {0}")]
    NetworkUnavailable(String),
    /// The authority committed the operation but the local commit failed.
    /// The cache is stale until the next reconciliation heals it.
    #[error("local commit failed after remote success: {0}")]
    PersistenceInconsistency(String),
    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Storage(format!("serialization error: {err}"))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}
