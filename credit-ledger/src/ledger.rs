//! Main ledger orchestration layer
//!
//! The concurrency-safe balance-mutation protocol. Every state-changing
//! operation is exactly one atomic unit:
//!
//! 1. acquire the seller's exclusive row lock (bounded wait);
//! 2. re-read the decision inputs under the lock;
//! 3. validate (pending status, sufficient balance);
//! 4. stage every row write into one batch;
//! 5. commit.
//!
//! A failed precondition or a lock timeout commits nothing. The lock is
//! what closes the check-then-act race: without it two concurrent sales
//! could each observe a sufficient balance and both proceed, and two
//! concurrent approvals could both see `pending`.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, Ledger};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let seller = ledger
//!         .create_seller("Seller 1", "seller1@test.com", "09120000001")
//!         .await?;
//!     let request = ledger.submit_credit_request(seller.seller_id, Decimal::new(500_000_00, 2))?;
//!     let balance = ledger.approve_credit(request.request_id, "admin").await?;
//!
//!     let sale = ledger
//!         .sell_charge(seller.seller_id, "09123456789", Decimal::new(5_000_00, 2))
//!         .await?;
//!     assert!(sale.new_balance < balance);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    locks::RowLocks,
    metrics::Metrics,
    types::{
        ChargeTarget, CreditRequest, CreditStatus, PhoneNumber, ReconciliationReport, Sale,
        Seller, TransactionKind, TransactionRecord, MONEY_SCALE,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use rocksdb::WriteBatch;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Durable store
    storage: Arc<Storage>,

    /// Row-lock manager (the serialization mechanism)
    locks: RowLocks,

    /// Prometheus metrics
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let locks = RowLocks::new(Duration::from_millis(config.lock_timeout_ms));
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            storage,
            locks,
            metrics,
        })
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Intake

    /// Create a new seller with zero balance
    ///
    /// The email lock makes the uniqueness check and the commit one
    /// atomic unit: of N concurrent creations with the same email
    /// exactly one succeeds and the rest fail with `AlreadyExists`.
    pub async fn create_seller(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Seller> {
        let seller = Seller::new(name, email, phone);

        let _row = self.locks.lock_email(&seller.email).await?;
        self.storage.create_seller(&seller)?;

        Ok(seller)
    }

    /// Submit a credit increase request in `pending` state
    pub fn submit_credit_request(&self, seller_id: Uuid, amount: Decimal) -> Result<CreditRequest> {
        let amount = validate_amount(amount)?;

        // Request intake needs no lock: nothing is decided yet
        self.storage.get_seller(seller_id)?;

        let request = CreditRequest::new(seller_id, amount);
        self.storage.create_request(&request)?;

        tracing::info!(
            request_id = %request.request_id,
            seller_id = %seller_id,
            amount = %amount,
            "Credit request submitted"
        );
        Ok(request)
    }

    // Mutations

    /// Approve a pending credit request and add its amount to the
    /// seller's balance
    ///
    /// Idempotent under concurrent duplicate calls: the status is
    /// re-read under the seller's row lock, so of N racing approvals
    /// exactly one succeeds and the rest fail with `AlreadyProcessed`.
    /// Returns the new balance.
    pub async fn approve_credit(&self, request_id: Uuid, actor: &str) -> Result<Decimal> {
        // Pre-lock read only routes to the owning seller; the status
        // check below is re-validated under the lock
        let seller_id = self.storage.get_request(request_id)?.seller_id;

        let _row = self.lock_seller(seller_id).await?;

        let mut request = self.storage.get_request(request_id)?;
        if request.status != CreditStatus::Pending {
            return Err(Error::AlreadyProcessed {
                request_id,
                status: request.status,
            });
        }

        let mut seller = self.storage.get_seller(seller_id)?;
        let now = Utc::now();

        seller.credit_balance += request.amount;
        seller.txn_seq += 1;
        seller.updated_at = now;

        let previous_status = request.status;
        request.status = CreditStatus::Approved;
        request.processed_at = Some(now);
        request.processed_by = Some(actor.to_string());

        let record = TransactionRecord {
            transaction_id: Uuid::now_v7(),
            seller_id,
            kind: TransactionKind::CreditIncrease,
            amount: request.amount,
            balance_after: seller.credit_balance,
            credit_request_id: Some(request_id),
            phone_number: None,
            description: format!("Credit increase from request {}", request_id),
            seq: seller.txn_seq,
            created_at: now,
        };

        let mut batch = WriteBatch::default();
        self.storage.stage_seller(&mut batch, &seller)?;
        self.storage
            .stage_request_transition(&mut batch, &request, previous_status)?;
        self.storage.stage_transaction(&mut batch, &record)?;
        self.storage.commit(batch)?;

        self.metrics.record_approval();
        tracing::info!(
            request_id = %request_id,
            seller_id = %seller_id,
            amount = %record.amount,
            new_balance = %seller.credit_balance,
            actor,
            "Credit request approved"
        );

        Ok(seller.credit_balance)
    }

    /// Reject a pending credit request
    ///
    /// Same lock discipline as approval; no balance mutation and no
    /// transaction record.
    pub async fn reject_credit(
        &self,
        request_id: Uuid,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        let seller_id = self.storage.get_request(request_id)?.seller_id;

        let _row = self.lock_seller(seller_id).await?;

        let mut request = self.storage.get_request(request_id)?;
        if request.status != CreditStatus::Pending {
            return Err(Error::AlreadyProcessed {
                request_id,
                status: request.status,
            });
        }

        let previous_status = request.status;
        request.status = CreditStatus::Rejected;
        request.processed_at = Some(Utc::now());
        request.processed_by = Some(actor.to_string());
        if let Some(reason) = reason {
            request.notes = reason.to_string();
        }

        let mut batch = WriteBatch::default();
        self.storage
            .stage_request_transition(&mut batch, &request, previous_status)?;
        self.storage.commit(batch)?;

        self.metrics.record_rejection();
        tracing::info!(request_id = %request_id, seller_id = %seller_id, actor, "Credit request rejected");

        Ok(())
    }

    /// Sell a charge to a destination, deducting from the seller's balance
    ///
    /// The seller row lock serializes concurrent sales against one
    /// seller; the balance is re-read under the lock, so a sale that
    /// would drive it negative fails with `InsufficientBalance` and
    /// writes nothing.
    pub async fn sell_charge(
        &self,
        seller_id: Uuid,
        destination: &str,
        amount: Decimal,
    ) -> Result<Sale> {
        let amount = validate_amount(amount)?;
        let number = PhoneNumber::parse(destination)?;

        let _row = self.lock_seller(seller_id).await?;

        let mut seller = self.storage.get_seller(seller_id)?;
        if !seller.is_active {
            return Err(Error::SellerInactive(seller_id));
        }

        if seller.credit_balance < amount {
            self.metrics.record_charge_refused();
            tracing::warn!(
                seller_id = %seller_id,
                available = %seller.credit_balance,
                required = %amount,
                "Charge sale refused: insufficient balance"
            );
            return Err(Error::InsufficientBalance {
                available: seller.credit_balance,
                required: amount,
                shortage: amount - seller.credit_balance,
            });
        }

        let now = Utc::now();
        seller.credit_balance -= amount;
        seller.txn_seq += 1;
        seller.updated_at = now;

        let record = TransactionRecord {
            transaction_id: Uuid::now_v7(),
            seller_id,
            kind: TransactionKind::ChargeSale,
            amount: -amount,
            balance_after: seller.credit_balance,
            credit_request_id: None,
            phone_number: Some(number.clone()),
            description: format!("Charge sale to {}", number),
            seq: seller.txn_seq,
            created_at: now,
        };

        // Seller lock is held; target lock second, fixed order
        let _target_row = self.locks.lock_target(&number).await?;
        let target = match self.storage.get_target(&number)? {
            Some(mut target) => {
                target.total_charged += amount;
                target.updated_at = now;
                target
            }
            None => ChargeTarget::new(number.clone(), amount),
        };

        let mut batch = WriteBatch::default();
        self.storage.stage_seller(&mut batch, &seller)?;
        self.storage.stage_transaction(&mut batch, &record)?;
        self.storage.stage_target(&mut batch, &target)?;
        self.storage.commit(batch)?;

        self.metrics
            .record_charge(amount.to_f64().unwrap_or(0.0));
        tracing::info!(
            seller_id = %seller_id,
            destination = %number,
            amount = %amount,
            new_balance = %seller.credit_balance,
            "Charge sale completed"
        );

        Ok(Sale {
            transaction_id: record.transaction_id,
            seller_id,
            phone_number: number,
            amount,
            new_balance: seller.credit_balance,
        })
    }

    /// Activate or deactivate a seller
    pub async fn set_seller_active(&self, seller_id: Uuid, active: bool) -> Result<()> {
        let _row = self.lock_seller(seller_id).await?;

        let mut seller = self.storage.get_seller(seller_id)?;
        seller.is_active = active;
        seller.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.storage.stage_seller(&mut batch, &seller)?;
        self.storage.commit(batch)
    }

    // Reads

    /// Compare a seller's stored balance against the fold of its
    /// transaction history
    ///
    /// Read-only and lock-free: both reads are against the committed,
    /// monotonically-growing log, so the result is a consistent
    /// snapshot (possibly stale if mutations are in flight). Never
    /// mutates state.
    pub fn reconcile(&self, seller_id: Uuid) -> Result<ReconciliationReport> {
        let seller = self.storage.get_seller(seller_id)?;
        let records = self.storage.transactions_for_seller(seller_id)?;

        let computed_balance: Decimal = records.iter().map(|r| r.amount).sum();
        let difference = seller.credit_balance - computed_balance;

        Ok(ReconciliationReport {
            seller_id,
            current_balance: seller.credit_balance,
            computed_balance,
            is_reconciled: difference.is_zero(),
            difference,
            transaction_count: records.len() as u64,
        })
    }

    /// Walk a seller's log and verify the `balance_after` chain
    ///
    /// Each entry's `balance_after` must equal the previous entry's
    /// plus this entry's signed amount, with a gap-free sequence
    /// starting from a zero opening balance. Returns the number of
    /// entries checked; a break is a `ConstraintViolation`.
    pub fn verify_balance_chain(&self, seller_id: Uuid) -> Result<u64> {
        let records = self.storage.transactions_for_seller(seller_id)?;

        let mut running = Decimal::ZERO;
        for (i, record) in records.iter().enumerate() {
            let expected_seq = i as u64 + 1;
            if record.seq != expected_seq {
                return Err(Error::ConstraintViolation(format!(
                    "seller {} log has seq {} where {} was expected",
                    seller_id, record.seq, expected_seq
                )));
            }

            running += record.amount;
            if record.balance_after != running {
                return Err(Error::ConstraintViolation(format!(
                    "seller {} log breaks at seq {}: balance_after {} but running balance {}",
                    seller_id, record.seq, record.balance_after, running
                )));
            }
        }

        Ok(records.len() as u64)
    }

    /// Get seller by ID
    pub fn seller(&self, seller_id: Uuid) -> Result<Seller> {
        self.storage.get_seller(seller_id)
    }

    /// Get credit request by ID
    pub fn credit_request(&self, request_id: Uuid) -> Result<CreditRequest> {
        self.storage.get_request(request_id)
    }

    /// Get a seller's transaction history in commit order, optionally
    /// filtered by kind
    pub fn transactions(
        &self,
        seller_id: Uuid,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<TransactionRecord>> {
        let records = self.storage.transactions_for_seller(seller_id)?;
        Ok(match kind {
            Some(kind) => records.into_iter().filter(|r| r.kind == kind).collect(),
            None => records,
        })
    }

    /// Get a seller's credit requests, optionally filtered by status
    pub fn requests_for_seller(
        &self,
        seller_id: Uuid,
        status: Option<CreditStatus>,
    ) -> Result<Vec<CreditRequest>> {
        let requests = self.storage.requests_for_seller(seller_id)?;
        Ok(match status {
            Some(status) => requests.into_iter().filter(|r| r.status == status).collect(),
            None => requests,
        })
    }

    /// Get cumulative bookkeeping for a destination
    pub fn charge_target(&self, destination: &str) -> Result<ChargeTarget> {
        let number = PhoneNumber::parse(destination)?;
        self.storage
            .get_target(&number)?
            .ok_or_else(|| Error::TargetNotFound(number.as_str().to_string()))
    }

    async fn lock_seller(&self, seller_id: Uuid) -> Result<crate::locks::RowGuard> {
        let wait = Instant::now();
        let guard = self.locks.lock_seller(seller_id).await?;
        self.metrics.record_lock_wait(wait.elapsed().as_secs_f64());
        Ok(guard)
    }
}

/// Validate a money amount: strictly positive, at most 2 decimal places
///
/// Accepted amounts are rescaled to exactly [`MONEY_SCALE`] so every
/// stored value uses one representation and balance chains cannot
/// drift.
fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if amount.scale() > MONEY_SCALE {
        return Err(Error::InvalidAmount(format!(
            "amount {} has more than {} decimal places",
            amount, MONEY_SCALE
        )));
    }

    let mut amount = amount;
    amount.rescale(MONEY_SCALE);
    Ok(amount)
}
