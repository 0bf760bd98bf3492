//! Concurrent correctness scenarios
//!
//! Every scenario here races real tasks against one ledger instance and
//! then audits the outcome: exact success counts, exact final balances,
//! reconciliation, and the `balance_after` chain.

use credit_ledger::{Config, Error, Ledger, TransactionKind};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

fn money(units: i64) -> Decimal {
    Decimal::new(units * 100, 2)
}

fn open_ledger() -> (Arc<Ledger>, tempfile::TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    // Heavy same-seller contention is expected; do not time out under it
    config.lock_timeout_ms = 60_000;
    (Arc::new(Ledger::open(config).unwrap()), temp)
}

/// Create a seller and run approved credits through the real approval path
async fn seeded_seller(ledger: &Ledger, credits: &[i64]) -> Uuid {
    let seller = ledger
        .create_seller("Seller 1", "seller1@test.com", "09120000001")
        .await
        .unwrap();
    for &units in credits {
        let request = ledger
            .submit_credit_request(seller.seller_id, money(units))
            .unwrap();
        ledger
            .approve_credit(request.request_id, "test")
            .await
            .unwrap();
    }
    seller.seller_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_approvals_succeed_exactly_once() {
    let (ledger, _temp) = open_ledger();

    let seller = ledger
        .create_seller("Seller 1", "seller1@test.com", "09120000001")
        .await
        .unwrap();
    let request = ledger
        .submit_credit_request(seller.seller_id, money(500_000))
        .unwrap();

    const RACERS: usize = 16;
    let mut handles = Vec::with_capacity(RACERS);
    for _ in 0..RACERS {
        let ledger = Arc::clone(&ledger);
        let request_id = request.request_id;
        handles.push(tokio::spawn(async move {
            ledger.approve_credit(request_id, "admin").await
        }));
    }

    let mut successes = 0;
    let mut already_processed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(balance) => {
                successes += 1;
                assert_eq!(balance, money(500_000));
            }
            Err(Error::AlreadyProcessed { .. }) => already_processed += 1,
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(already_processed, RACERS - 1);

    // Exactly one credit_increase record, balance credited once
    let credits = ledger
        .transactions(seller.seller_id, Some(TransactionKind::CreditIncrease))
        .unwrap();
    assert_eq!(credits.len(), 1);
    assert_eq!(
        ledger.seller(seller.seller_id).unwrap().credit_balance,
        money(500_000)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_overdraw_admits_exactly_floor_of_balance() {
    let (ledger, _temp) = open_ledger();

    // Balance 30,000; 10 concurrent sales of 7,000 each
    let seller_id = seeded_seller(&ledger, &[30_000]).await;

    const SALES: usize = 10;
    const AMOUNT: i64 = 7_000;
    let mut handles = Vec::with_capacity(SALES);
    for i in 0..SALES {
        let ledger = Arc::clone(&ledger);
        let phone = format!("0912{:07}", i);
        handles.push(tokio::spawn(async move {
            ledger.sell_charge(seller_id, &phone, money(AMOUNT)).await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(Error::InsufficientBalance { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }

    // floor(30000 / 7000) = 4
    assert_eq!(succeeded, 4);
    assert_eq!(insufficient, SALES - 4);
    assert_eq!(
        ledger.seller(seller_id).unwrap().credit_balance,
        money(30_000 - 4 * AMOUNT)
    );

    let report = ledger.reconcile(seller_id).unwrap();
    assert!(report.is_reconciled);
    ledger.verify_balance_chain(seller_id).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn thousand_concurrent_sales_drain_balance_to_exactly_zero() {
    let (ledger, _temp) = open_ledger();

    // 10 approvals of 500,000 each -> balance 5,000,000
    let seller_id = seeded_seller(&ledger, &[500_000; 10]).await;
    assert_eq!(
        ledger.seller(seller_id).unwrap().credit_balance,
        money(5_000_000)
    );

    // 1,000 concurrent sales of 5,000 each: all must succeed
    const SALES: usize = 1_000;
    let mut handles = Vec::with_capacity(SALES);
    for i in 0..SALES {
        let ledger = Arc::clone(&ledger);
        let phone = format!("0912{:07}", i % 200);
        handles.push(tokio::spawn(async move {
            ledger.sell_charge(seller_id, &phone, money(5_000)).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }
    assert_eq!(succeeded, SALES);

    assert_eq!(
        ledger.seller(seller_id).unwrap().credit_balance,
        Decimal::ZERO
    );

    let report = ledger.reconcile(seller_id).unwrap();
    assert!(report.is_reconciled);
    assert_eq!(report.difference, Decimal::ZERO);
    assert_eq!(report.transaction_count, 1_010);

    assert_eq!(ledger.verify_balance_chain(seller_id).unwrap(), 1_010);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn mixed_concurrent_credits_and_sales_stay_reconciled() {
    let (ledger, _temp) = open_ledger();

    let seller_id = seeded_seller(&ledger, &[100_000]).await;

    // Pre-submit pending requests so approvals race the sales
    let mut request_ids = Vec::new();
    for _ in 0..20 {
        let request = ledger
            .submit_credit_request(seller_id, money(10_000))
            .unwrap();
        request_ids.push(request.request_id);
    }

    let mut handles = Vec::new();
    for request_id in request_ids {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.approve_credit(request_id, "admin").await.map(|_| ())
        }));
    }
    for i in 0..100 {
        let ledger = Arc::clone(&ledger);
        let phone = format!("0912{:07}", i);
        handles.push(tokio::spawn(async move {
            ledger
                .sell_charge(seller_id, &phone, money(4_000))
                .await
                .map(|_| ())
        }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) | Err(Error::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }

    let seller = ledger.seller(seller_id).unwrap();
    assert!(seller.credit_balance >= Decimal::ZERO);

    let report = ledger.reconcile(seller_id).unwrap();
    assert!(report.is_reconciled);
    ledger.verify_balance_chain(seller_id).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sales_against_different_sellers_run_independently() {
    let (ledger, _temp) = open_ledger();

    let mut seller_ids = Vec::new();
    for i in 0..4 {
        let seller = ledger
            .create_seller(
                format!("Seller {}", i + 1),
                format!("seller{}@test.com", i + 1),
                format!("0912000{:04}", i + 1),
            )
            .await
            .unwrap();
        let request = ledger
            .submit_credit_request(seller.seller_id, money(50_000))
            .unwrap();
        ledger
            .approve_credit(request.request_id, "test")
            .await
            .unwrap();
        seller_ids.push(seller.seller_id);
    }

    let mut handles = Vec::new();
    for (i, seller_id) in seller_ids.iter().copied().enumerate() {
        for j in 0..25 {
            let ledger = Arc::clone(&ledger);
            let phone = format!("0912{:03}{:04}", i, j);
            handles.push(tokio::spawn(async move {
                ledger.sell_charge(seller_id, &phone, money(2_000)).await
            }));
        }
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for seller_id in seller_ids {
        assert_eq!(
            ledger.seller(seller_id).unwrap().credit_balance,
            money(50_000 - 25 * 2_000)
        );
        assert!(ledger.reconcile(seller_id).unwrap().is_reconciled);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_creations_with_one_email_succeed_exactly_once() {
    let (ledger, _temp) = open_ledger();

    const RACERS: usize = 16;
    let mut handles = Vec::with_capacity(RACERS);
    for i in 0..RACERS {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger
                .create_seller(
                    format!("Seller {}", i + 1),
                    "shared@test.com",
                    format!("0912000{:04}", i + 1),
                )
                .await
        }));
    }

    let mut created = Vec::new();
    let mut already_exists = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(seller) => created.push(seller),
            Err(Error::AlreadyExists(_)) => already_exists += 1,
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }

    assert_eq!(created.len(), 1);
    assert_eq!(already_exists, RACERS - 1);

    // The surviving row is the winner's, and the email stays taken
    let winner = &created[0];
    assert_eq!(
        ledger.seller(winner.seller_id).unwrap().email,
        "shared@test.com"
    );
    let err = ledger
        .create_seller("Latecomer", "shared@test.com", "09129999999")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn reconcile_is_idempotent_under_no_writes() {
    let (ledger, _temp) = open_ledger();

    let seller_id = seeded_seller(&ledger, &[10_000, 20_000]).await;
    ledger
        .sell_charge(seller_id, "09123456789", money(5_000))
        .await
        .unwrap();

    let first = ledger.reconcile(seller_id).unwrap();
    let second = ledger.reconcile(seller_id).unwrap();
    assert_eq!(first, second);
    assert!(first.is_reconciled);
    assert_eq!(first.transaction_count, 3);
}
