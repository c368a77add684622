use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures surfaced by the ledger engine and the expense store.
///
/// The three kinds are never folded into each other: validation errors are
/// the caller's fault and are not retried, integrity errors mean the stored
/// ledger is inconsistent, persistence errors come from the backing store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ledger integrity violated: {0}")]
    Integrity(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }
}

impl From<mongodb::error::Error> for LedgerError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
