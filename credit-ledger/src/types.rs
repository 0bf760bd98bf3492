//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Closed status enums with exhaustive transition handling

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed scale for all money values (2 decimal places)
pub const MONEY_SCALE: u32 = 2;

/// Destination phone number for a charge sale
///
/// Stored normalized: digits only, at least 10 of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a raw destination string
    ///
    /// Strips every non-digit character and requires at least 10 digits.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 10 {
            return Err(crate::Error::InvalidDestination(raw.to_string()));
        }
        Ok(Self(digits))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seller account row
///
/// `credit_balance` is only mutated by the ledger's two write operations
/// and is non-negative at every committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    /// Unique seller ID (UUIDv7 for time-ordering)
    pub seller_id: Uuid,

    /// Display name
    pub name: String,

    /// Contact email (unique across sellers)
    pub email: String,

    /// Seller's own phone number
    pub phone: String,

    /// Current credit balance (scale 2, never negative)
    pub credit_balance: Decimal,

    /// Per-seller transaction sequence counter
    ///
    /// Incremented once per appended transaction, under the seller's row
    /// lock, so the sequence order equals lock-acquisition order.
    pub txn_seq: u64,

    /// Whether the seller may sell charges
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Seller {
    /// Create a new active seller with zero balance
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            seller_id: Uuid::now_v7(),
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            credit_balance: Decimal::ZERO,
            txn_seq: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Credit request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CreditStatus {
    /// Awaiting an administrator decision
    Pending = 1,
    /// Approved; balance was increased exactly once (terminal)
    Approved = 2,
    /// Rejected; no balance change (terminal)
    Rejected = 3,
}

impl CreditStatus {
    /// Terminal states admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, CreditStatus::Approved | CreditStatus::Rejected)
    }

    /// Lowercase name as stored in descriptions and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Pending => "pending",
            CreditStatus::Approved => "approved",
            CreditStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A seller's request for a credit increase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRequest {
    /// Unique request ID
    pub request_id: Uuid,

    /// Owning seller
    pub seller_id: Uuid,

    /// Requested amount (> 0, scale 2)
    pub amount: Decimal,

    /// Lifecycle status
    pub status: CreditStatus,

    /// Submission timestamp
    pub requested_at: DateTime<Utc>,

    /// Decision timestamp (None until terminal)
    pub processed_at: Option<DateTime<Utc>>,

    /// Identifier of the approving/rejecting actor
    pub processed_by: Option<String>,

    /// Free-form notes (rejection reason)
    pub notes: String,
}

impl CreditRequest {
    /// Create a new pending request
    pub fn new(seller_id: Uuid, amount: Decimal) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            seller_id,
            amount,
            status: CreditStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
            processed_by: None,
            notes: String::new(),
        }
    }
}

/// Kind of balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    /// Administrator-approved credit increase (positive amount)
    CreditIncrease = 1,
    /// Customer-facing charge sale (negative amount)
    ChargeSale = 2,
}

impl TransactionKind {
    /// Lowercase name as stored in descriptions and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::CreditIncrease => "credit_increase",
            TransactionKind::ChargeSale => "charge_sale",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable transaction log entry
///
/// Append-only: once committed it is never updated or deleted. The
/// per-seller `(seq, balance_after)` chain is the ground truth for
/// reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction ID
    pub transaction_id: Uuid,

    /// Owning seller
    pub seller_id: Uuid,

    /// Mutation kind
    pub kind: TransactionKind,

    /// Signed amount: positive for credit increase, negative for charge sale
    pub amount: Decimal,

    /// Seller's balance immediately after this entry
    pub balance_after: Decimal,

    /// Originating credit request (credit increases only)
    pub credit_request_id: Option<Uuid>,

    /// Charged destination (charge sales only)
    pub phone_number: Option<PhoneNumber>,

    /// Human-readable description
    pub description: String,

    /// Position in the seller's log (1-based, gap-free)
    pub seq: u64,

    /// Commit timestamp
    pub created_at: DateTime<Utc>,
}

/// Cumulative bookkeeping for one charge destination
///
/// Created lazily on first charge, upserted inside the sale's commit
/// unit, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeTarget {
    /// Destination number (unique key)
    pub number: PhoneNumber,

    /// Sum of all charges ever sold to this destination
    pub total_charged: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last charge timestamp
    pub updated_at: DateTime<Utc>,
}

impl ChargeTarget {
    /// Create a target for its first charge
    pub fn new(number: PhoneNumber, first_charge: Decimal) -> Self {
        let now = Utc::now();
        Self {
            number,
            total_charged: first_charge,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Successful charge sale payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    /// The appended transaction
    pub transaction_id: Uuid,

    /// Seller that was debited
    pub seller_id: Uuid,

    /// Charged destination
    pub phone_number: PhoneNumber,

    /// Amount deducted
    pub amount: Decimal,

    /// Balance after the deduction
    pub new_balance: Decimal,
}

/// Result of comparing a stored balance against its transaction history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Seller under audit
    pub seller_id: Uuid,

    /// Balance as stored on the account row
    pub current_balance: Decimal,

    /// Balance recomputed by folding the transaction log
    pub computed_balance: Decimal,

    /// True iff `difference` is zero
    pub is_reconciled: bool,

    /// `current_balance - computed_balance`
    pub difference: Decimal,

    /// Number of log entries folded
    pub transaction_count: u64,
}
