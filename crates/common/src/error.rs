use crate::types::Hash;
use thiserror::Error;

/// Common error types for the ledgerlink engine
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Block failed structural self-consistency checks
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Block already stored; informational
    #[error("Duplicate link: {0}")]
    DuplicateLink(Hash),

    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Absent link, genesis or ancestor
    #[error("Not found: {0}")]
    NotFound(String),

    /// A chain invariant was violated (e.g. two tips without a shared genesis)
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Rejected peer input, as opposed to a local failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::Validation(_) | LedgerError::DuplicateLink(_))
    }
}

/// Storage specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Link not found: {0}")]
    Missing(Hash),

    #[error("Refusing to remove resolved link: {0}")]
    NotOrphan(Hash),

    #[error("Encoding failed: {0}")]
    Codec(String),

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Validation specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Merkle root mismatch: header {expected}, computed {actual}")]
    MerkleMismatch { expected: Hash, actual: Hash },

    #[error("Invalid difficulty target: {0}")]
    InvalidTarget(String),

    #[error("Insufficient proof of work for block {0}")]
    InsufficientWork(Hash),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("Empty block")]
    EmptyBlock,

    #[error("Invalid transaction at index {index}: {reason}")]
    InvalidTransaction { index: usize, reason: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(LedgerError::DuplicateLink(Hash::ZERO).is_recoverable());
        assert!(LedgerError::from(ValidationError::EmptyBlock).is_recoverable());
        assert!(!LedgerError::from(StorageError::Backend("io".into())).is_recoverable());
        assert!(!LedgerError::Invariant("disconnected".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = LedgerError::from(StorageError::Missing(Hash::ZERO));
        assert!(err.to_string().starts_with("Storage error: Link not found"));
    }
}
