//! Concurrent load scenario driver
//!
//! Seeds a handful of sellers with approved credit, fires a burst of
//! concurrent charge sales at random sellers and destinations, then
//! reconciles every seller and verifies its balance chain. Exits
//! non-zero if any seller fails reconciliation.

use anyhow::{bail, Result};
use credit_ledger::{Config, Error, Ledger};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const SELLERS: usize = 5;
const CREDITS_PER_SELLER: usize = 3;
const CREDIT_AMOUNT: i64 = 1_000_000;
const PHONES: usize = 200;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let tasks: usize = std::env::var("LOADTEST_TASKS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2_000);

    let mut config = Config::from_env()?;
    if std::env::var("CREDIT_LEDGER_DATA_DIR").is_err() {
        config.data_dir = std::env::temp_dir().join(format!("credit-ledger-load-{}", Uuid::now_v7()));
    }

    let ledger = Arc::new(Ledger::open(config)?);

    // Seed sellers with approved credit
    let mut seller_ids = Vec::with_capacity(SELLERS);
    for i in 0..SELLERS {
        let seller = ledger
            .create_seller(
                format!("Seller {}", i + 1),
                format!("seller{}@test.com", i + 1),
                format!("0912000{:04}", i + 1),
            )
            .await?;
        for _ in 0..CREDITS_PER_SELLER {
            let request =
                ledger.submit_credit_request(seller.seller_id, Decimal::new(CREDIT_AMOUNT * 100, 2))?;
            ledger.approve_credit(request.request_id, "loadtest").await?;
        }
        seller_ids.push(seller.seller_id);
    }

    let phones: Vec<String> = (0..PHONES).map(|i| format!("0912{:07}", i)).collect();
    let amounts = [1_000i64, 2_000, 5_000, 10_000];

    // Pick every task's inputs up front so tasks spawn without an rng
    let mut rng = rand::thread_rng();
    let plan: Vec<(Uuid, String, Decimal)> = (0..tasks)
        .map(|_| {
            (
                seller_ids[rng.gen_range(0..seller_ids.len())],
                phones[rng.gen_range(0..phones.len())].clone(),
                Decimal::new(amounts[rng.gen_range(0..amounts.len())] * 100, 2),
            )
        })
        .collect();

    let started = Instant::now();
    let mut handles = Vec::with_capacity(tasks);
    for (seller_id, phone, amount) in plan {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.sell_charge(seller_id, &phone, amount).await
        }));
    }

    let mut succeeded = 0u64;
    let mut insufficient = 0u64;
    let mut other_failures = 0u64;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(Error::InsufficientBalance { .. }) => insufficient += 1,
            Err(err) => {
                tracing::error!(%err, "unexpected sale failure");
                other_failures += 1;
            }
        }
    }
    let elapsed = started.elapsed();

    // Audit every seller
    let mut reports = Vec::with_capacity(seller_ids.len());
    let mut all_reconciled = true;
    for seller_id in &seller_ids {
        let report = ledger.reconcile(*seller_id)?;
        ledger.verify_balance_chain(*seller_id)?;
        all_reconciled &= report.is_reconciled;
        reports.push(report);
    }

    let summary = serde_json::json!({
        "tasks": tasks,
        "succeeded": succeeded,
        "insufficient_balance": insufficient,
        "other_failures": other_failures,
        "elapsed_ms": elapsed.as_millis(),
        "sales_per_second": succeeded as f64 / elapsed.as_secs_f64(),
        "all_reconciled": all_reconciled,
        "sellers": reports,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !all_reconciled || other_failures > 0 {
        bail!("load run left the ledger unreconciled");
    }
    Ok(())
}
