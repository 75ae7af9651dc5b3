//! Concurrency tests for the transaction processor.
//!
//! These run on a multi-threaded runtime so that workers really race on the
//! same account; the in-memory ledger store's per-row lock is the only thing
//! keeping the balance consistent.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use banking_ledger_core::account::AccountNumber;
use banking_ledger_core::error::LedgerError;
use banking_ledger_core::ledger_entry::EntryStatus;
use banking_ledger_core::transaction::{TransactionData, TransactionType};
use banking_ledger_runtime::TransactionProcessor;
use banking_ledger_testing::{InMemoryHistoryStore, InMemoryLedgerStore, test_clock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Barrier;

fn a1() -> AccountNumber {
    AccountNumber::new("A1")
}

fn withdrawal(amount: Decimal, id: usize) -> TransactionData {
    TransactionData {
        account_number: a1(),
        amount,
        kind: TransactionType::Withdrawal,
        transaction_id: format!("w-{id}"),
        description: None,
    }
}

fn deposit(amount: Decimal, id: usize) -> TransactionData {
    TransactionData {
        account_number: a1(),
        amount,
        kind: TransactionType::Deposit,
        transaction_id: format!("d-{id}"),
        description: None,
    }
}

fn processor(ledger: &InMemoryLedgerStore, history: &InMemoryHistoryStore) -> TransactionProcessor {
    TransactionProcessor::new(
        Arc::new(ledger.clone()),
        Arc::new(history.clone()),
        Arc::new(test_clock()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_withdrawals_of_60_against_100_never_double_spend() {
    for _ in 0..20 {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        let history = InMemoryHistoryStore::new();
        let processor = processor(&ledger, &history);
        let barrier = Arc::new(Barrier::new(2));

        let tasks: Vec<_> = (0..2)
            .map(|id| {
                let processor = processor.clone();
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    processor.process(&withdrawal(dec!(60), id)).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.expect("task panicked"));
        }

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let overdrafts = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(LedgerError::InsufficientFunds { balance, requested })
                        if *balance == dec!(40) && *requested == dec!(60)
                )
            })
            .count();

        assert_eq!(successes, 1);
        assert_eq!(overdrafts, 1);
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(40)));

        let mut statuses: Vec<_> = history
            .entries("transactions")
            .iter()
            .map(|entry| (entry.status, entry.balance))
            .collect();
        statuses.sort_by_key(|(status, _)| status.as_str());
        assert_eq!(
            statuses,
            vec![
                (EntryStatus::Completed, dec!(40)),
                (EntryStatus::Failed, dec!(40)),
            ]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mix_conserves_money() {
    let ledger = InMemoryLedgerStore::new();
    ledger.seed_account("A1", dec!(100)).await;
    let history = InMemoryHistoryStore::new();
    let processor = processor(&ledger, &history);

    let mut tasks = Vec::new();
    for id in 0..50 {
        let p = processor.clone();
        tasks.push(tokio::spawn(async move {
            (TransactionType::Deposit, dec!(10), p.process(&deposit(dec!(10), id)).await)
        }));
        let p = processor.clone();
        tasks.push(tokio::spawn(async move {
            (TransactionType::Withdrawal, dec!(17), p.process(&withdrawal(dec!(17), id)).await)
        }));
    }

    let mut expected = dec!(100);
    let mut committed = 0;
    for task in tasks {
        let (kind, amount, result) = task.await.expect("task panicked");
        match result {
            Ok(balance) => {
                assert!(balance >= Decimal::ZERO);
                committed += 1;
                match kind {
                    TransactionType::Deposit => expected += amount,
                    _ => expected -= amount,
                }
            }
            Err(error) => {
                assert!(matches!(error, LedgerError::InsufficientFunds { .. }));
                assert_eq!(kind, TransactionType::Withdrawal);
            }
        }
    }

    let final_balance = ledger.balance(&a1()).await.unwrap();
    assert_eq!(final_balance, expected);
    assert!(final_balance >= Decimal::ZERO);

    let entries = history.entries("transactions");
    assert_eq!(entries.len(), 100);
    assert_eq!(entries.iter().filter(|e| e.is_completed()).count(), committed);
    assert!(entries.iter().all(|e| e.balance >= Decimal::ZERO));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_accounts_do_not_block_each_other() {
    let ledger = InMemoryLedgerStore::new();
    ledger.seed_account("A1", dec!(0)).await;
    ledger.seed_account("B2", dec!(0)).await;
    let history = InMemoryHistoryStore::new();
    let processor = processor(&ledger, &history);

    let mut tasks = Vec::new();
    for id in 0..20 {
        for account in ["A1", "B2"] {
            let p = processor.clone();
            tasks.push(tokio::spawn(async move {
                let mut data = deposit(dec!(5), id);
                data.account_number = AccountNumber::new(account);
                p.process(&data).await
            }));
        }
    }
    for task in tasks {
        task.await.expect("task panicked").unwrap();
    }

    assert_eq!(ledger.balance(&AccountNumber::new("A1")).await, Some(dec!(100)));
    assert_eq!(ledger.balance(&AccountNumber::new("B2")).await, Some(dec!(100)));
}
