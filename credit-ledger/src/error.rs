//! Error types for the ledger

use crate::types::CreditStatus;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Seller not found
    #[error("Seller not found: {0}")]
    SellerNotFound(Uuid),

    /// Credit request not found
    #[error("Credit request not found: {0}")]
    RequestNotFound(Uuid),

    /// Charge target not found
    #[error("Charge target not found: {0}")]
    TargetNotFound(String),

    /// Amount is non-positive or carries more than 2 decimal places
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Destination is not a valid phone number
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Credit request already left the pending state
    #[error("Credit request {request_id} already processed (status: {status})")]
    AlreadyProcessed {
        /// Request that was reprocessed
        request_id: Uuid,
        /// Terminal status it already holds
        status: CreditStatus,
    },

    /// Sale would drive the balance negative
    #[error("Insufficient balance: available {available}, required {required}, shortage {shortage}")]
    InsufficientBalance {
        /// Balance at the time of the check
        available: Decimal,
        /// Amount the sale asked for
        required: Decimal,
        /// `required - available`
        shortage: Decimal,
    },

    /// Seller exists but is deactivated
    #[error("Seller is not active: {0}")]
    SellerInactive(Uuid),

    /// Unique constraint hit on creation (duplicate seller email)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Timed out waiting for a row lock (retryable)
    #[error("Lock timeout on row {key} after {waited_ms}ms")]
    LockTimeout {
        /// Locked row that could not be acquired
        key: String,
        /// How long the caller waited
        waited_ms: u64,
    },

    /// Storage error (RocksDB), retryable
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// The storage-level non-negative balance or append-only guard fired.
    /// Unreachable given the application-level checks; a logic-bug signal.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Infrastructure failures the caller may retry; everything else is
    /// a definitive outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout { .. } | Error::Storage(_))
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
    fn test_retryability() {
        let timeout = Error::LockTimeout {
            key: "seller/abc".to_string(),
            waited_ms: 5000,
        };
        assert!(timeout.is_retryable());

        let insufficient = Error::InsufficientBalance {
            available: Decimal::new(30_000_00, 2),
            required: Decimal::new(50_000_00, 2),
            shortage: Decimal::new(20_000_00, 2),
        };
        assert!(!insufficient.is_retryable());

        let processed = Error::AlreadyProcessed {
            request_id: Uuid::now_v7(),
            status: CreditStatus::Approved,
        };
        assert!(!processed.is_retryable());
    }
}
