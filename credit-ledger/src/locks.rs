//! Row-level lock manager
//!
//! The durable store's lock manager: one exclusive lock per seller row
//! and per charge-target row, plus a lock per seller email to make
//! creation uniqueness checks atomic. This is what serializes
//! concurrent mutators of the same account. It is the explicit
//! rendition of a relational store's `SELECT ... FOR UPDATE`.
//!
//! Operations against different rows never contend. Waiting on a held
//! lock is bounded by the configured timeout; expiry surfaces as a
//! retryable [`Error::LockTimeout`], never as an unbounded hang.

use crate::types::PhoneNumber;
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Exclusive hold on one row, released on drop
#[derive(Debug)]
pub struct RowGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Per-row lock table
///
/// Entries are never evicted: the table keeps one small entry per
/// distinct row ever locked, the working set of sellers and targets.
/// That matches a store-side lock table and keeps acquisition a single
/// map probe.
#[derive(Debug)]
pub struct RowLocks {
    rows: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl RowLocks {
    /// Create a lock table with the given maximum wait per acquisition
    pub fn new(timeout: Duration) -> Self {
        Self {
            rows: DashMap::new(),
            timeout,
        }
    }

    /// Lock a seller's account row
    pub async fn lock_seller(&self, seller_id: Uuid) -> Result<RowGuard> {
        self.acquire(format!("seller/{}", seller_id)).await
    }

    /// Lock a seller email for the duration of a creation check
    ///
    /// Serializes concurrent `create_seller` calls for one email so the
    /// uniqueness check and the commit form a single atomic unit.
    pub async fn lock_email(&self, email: &str) -> Result<RowGuard> {
        self.acquire(format!("email/{}", email)).await
    }

    /// Lock a charge target row
    ///
    /// Callers that hold a seller lock must acquire the target lock
    /// second; the fixed seller-then-target order rules out deadlock.
    pub async fn lock_target(&self, number: &PhoneNumber) -> Result<RowGuard> {
        self.acquire(format!("target/{}", number)).await
    }

    async fn acquire(&self, key: String) -> Result<RowGuard> {
        let mutex = {
            let entry = self
                .rows
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };

        match tokio::time::timeout(self.timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(RowGuard { _guard: guard }),
            Err(_) => Err(Error::LockTimeout {
                key,
                waited_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
