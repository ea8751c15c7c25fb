//! Error types for the credit ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// No balance row exists for the user
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A balance row already exists for the user
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Zero, wrong-signed, or over-ceiling amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Missing or over-length description
    #[error("Invalid description: {0}")]
    InvalidDescription(String),

    /// Empty or malformed user identifier
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    /// Deduction would drive the balance negative. Normal business
    /// outcome, never retried; carries enough detail to prompt a recharge.
    #[error("Insufficient credits: balance {balance}, required {required}, deficit {deficit}")]
    InsufficientCredits {
        /// Balance at the time of the attempt
        balance: i64,
        /// Credits the operation needed
        required: i64,
        /// How many credits were missing
        deficit: i64,
    },

    /// Admin identity lacks privilege
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (writer mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may retry the failed operation. Only
    /// infrastructure faults qualify; validation failures and
    /// `InsufficientCredits` are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Concurrency(_) | Error::Io(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(Error::Storage("db closed".to_string()).is_retryable());
        assert!(Error::Concurrency("mailbox closed".to_string()).is_retryable());
        assert!(!Error::UserNotFound("u1".to_string()).is_retryable());
        assert!(!Error::InsufficientCredits {
            balance: 5,
            required: 10,
            deficit: 5
        }
        .is_retryable());
    }
}
