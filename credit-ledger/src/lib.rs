//! Credit Ledger
//!
//! Concurrency-safe per-seller credit ledger for charge sales.
//!
//! # Architecture
//!
//! - **Row Locking**: One exclusive lock per seller account row; every
//!   balance decision is re-validated under the lock
//! - **Atomic Commits**: All rows of an operation land in one batch or
//!   not at all
//! - **Append-Only Log**: Every balance mutation is immutably recorded
//! - **Reconciliation**: The stored balance always equals the fold of
//!   its logged history
//!
//! # Invariants
//!
//! - Non-negativity: `credit_balance >= 0` at every committed state
//! - Exactly-once approval: a credit request leaves `pending` at most once
//! - Append-only: transactions are never modified or deleted
//! - Per-seller ordering: the log's sequence order equals row-lock
//!   acquisition order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use types::{
    ChargeTarget, CreditRequest, CreditStatus, PhoneNumber, ReconciliationReport, Sale, Seller,
    TransactionKind, TransactionRecord,
};
