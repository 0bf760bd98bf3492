//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger:
//!
//! - `ledger_credit_approvals_total` - Approved credit requests
//! - `ledger_credit_rejections_total` - Rejected credit requests
//! - `ledger_charges_total` - Completed charge sales
//! - `ledger_charges_refused_total` - Sales refused for insufficient balance
//! - `ledger_charge_amount` - Histogram of charged amounts
//! - `ledger_lock_wait_seconds` - Histogram of row-lock wait times

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Approved credit requests
    pub credit_approvals_total: IntCounter,

    /// Rejected credit requests
    pub credit_rejections_total: IntCounter,

    /// Completed charge sales
    pub charges_total: IntCounter,

    /// Sales refused for insufficient balance
    pub charges_refused_total: IntCounter,

    /// Charged amount histogram
    pub charge_amount: Histogram,

    /// Row-lock wait histogram
    pub lock_wait: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let credit_approvals_total = IntCounter::with_opts(Opts::new(
            "ledger_credit_approvals_total",
            "Approved credit requests",
        ))?;
        registry.register(Box::new(credit_approvals_total.clone()))?;

        let credit_rejections_total = IntCounter::with_opts(Opts::new(
            "ledger_credit_rejections_total",
            "Rejected credit requests",
        ))?;
        registry.register(Box::new(credit_rejections_total.clone()))?;

        let charges_total = IntCounter::with_opts(Opts::new(
            "ledger_charges_total",
            "Completed charge sales",
        ))?;
        registry.register(Box::new(charges_total.clone()))?;

        let charges_refused_total = IntCounter::with_opts(Opts::new(
            "ledger_charges_refused_total",
            "Sales refused for insufficient balance",
        ))?;
        registry.register(Box::new(charges_refused_total.clone()))?;

        let charge_amount = Histogram::with_opts(
            HistogramOpts::new("ledger_charge_amount", "Histogram of charged amounts").buckets(
                vec![
                    1_000.0, 5_000.0, 10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0,
                ],
            ),
        )?;
        registry.register(Box::new(charge_amount.clone()))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("ledger_lock_wait_seconds", "Histogram of row-lock wait times")
                .buckets(vec![0.0001, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        Ok(Self {
            credit_approvals_total,
            credit_rejections_total,
            charges_total,
            charges_refused_total,
            charge_amount,
            lock_wait,
            registry,
        })
    }

    /// Record an approved credit request
    pub fn record_approval(&self) {
        self.credit_approvals_total.inc();
    }

    /// Record a rejected credit request
    pub fn record_rejection(&self) {
        self.credit_rejections_total.inc();
    }

    /// Record a completed charge sale
    pub fn record_charge(&self, amount: f64) {
        self.charges_total.inc();
        self.charge_amount.observe(amount);
    }

    /// Record a sale refused for insufficient balance
    pub fn record_charge_refused(&self) {
        self.charges_refused_total.inc();
    }

    /// Record time spent waiting for a row lock
    pub fn record_lock_wait(&self, seconds: f64) {
        self.lock_wait.observe(seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metrics registration cannot fail on a fresh registry")
    }
}
