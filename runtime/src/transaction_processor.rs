//! Deposits and withdrawals under a row lock.
//!
//! # Attempt lifecycle
//!
//! ```text
//! RECEIVED ──► LOCK_ACQUIRED ──► APPLIED ──┐
//!    │               │                     ├──► AUDITED
//!    └───────────────┴─────► REJECTED ─────┘
//! ```
//!
//! Step 1 is a locked read-modify-write inside one ledger store transaction:
//! begin, lock the `ACTIVE` row and read its balance, compute the new
//! balance, write it, commit. Any failure rolls the transaction back, which
//! releases the row lock.
//!
//! Step 2 always runs: one [`LedgerEntry`] is appended, `COMPLETED` with the
//! new balance or `FAILED` with the balance observed when the attempt
//! failed. The append is best effort.
//!
//! Amount and type checks run before the store is touched, so a rejected
//! amount never takes a lock. Its `FAILED` entry carries a zero balance
//! because no balance was read.

use crate::audit::append_entry;
use crate::metrics::LedgerMetrics;
use banking_ledger_core::clock::Clock;
use banking_ledger_core::error::LedgerError;
use banking_ledger_core::history_store::HistoryStore;
use banking_ledger_core::ledger_entry::{EntryStatus, LedgerEntry};
use banking_ledger_core::ledger_store::{LedgerStore, LedgerTransaction};
use banking_ledger_core::transaction::TransactionData;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stage of one transaction attempt, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    /// Command decoded and handed to the processor
    Received,
    /// Row lock held on an active account
    LockAcquired,
    /// New balance committed
    Applied,
    /// Attempt failed; nothing committed
    Rejected,
    /// Audit append attempted
    Audited,
}

impl AttemptStage {
    /// Upper-case label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::LockAcquired => "LOCK_ACQUIRED",
            Self::Applied => "APPLIED",
            Self::Rejected => "REJECTED",
            Self::Audited => "AUDITED",
        }
    }
}

impl fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies [`TransactionData`] commands to the ledger store.
#[derive(Clone)]
pub struct TransactionProcessor {
    ledger: Arc<dyn LedgerStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    collection: String,
}

impl TransactionProcessor {
    /// Create a processor that audits into the default `transactions`
    /// collection.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            history,
            clock,
            collection: crate::DEFAULT_HISTORY_COLLECTION.to_string(),
        }
    }

    /// Audit into a different history collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Apply one deposit or withdrawal and record the outcome.
    ///
    /// Returns the committed balance. Whatever the outcome, exactly one
    /// ledger entry append is attempted before returning.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] / [`LedgerError::InvalidTransactionType`]:
    ///   rejected before any store access
    /// - [`LedgerError::AccountNotFoundOrInactive`]: no `ACTIVE` row matched
    /// - [`LedgerError::InsufficientFunds`]: withdrawal above the locked balance
    /// - [`LedgerError::Store`]: begin, lock, update or commit failed
    #[tracing::instrument(
        name = "transaction",
        skip(self, data),
        fields(
            transaction_id = %data.transaction_id,
            account_number = %data.account_number,
            kind = %data.kind,
            amount = %data.amount,
        )
    )]
    pub async fn process(&self, data: &TransactionData) -> Result<Decimal, LedgerError> {
        debug!(stage = %AttemptStage::Received, "Processing transaction");

        let mut observed = Decimal::ZERO;
        let result = self.locked_update(data, &mut observed).await;

        let entry = match &result {
            Ok(new_balance) => {
                info!(stage = %AttemptStage::Applied, balance = %new_balance, "Transaction applied");
                LedgerMetrics::transaction_completed(data.kind.as_str());
                LedgerEntry::for_transaction(
                    data,
                    EntryStatus::Completed,
                    *new_balance,
                    self.clock.now(),
                )
            }
            Err(error) => {
                warn!(
                    stage = %AttemptStage::Rejected,
                    balance = %observed,
                    error = %error,
                    "Transaction rejected"
                );
                LedgerMetrics::transaction_failed(data.kind.as_str(), error);
                LedgerEntry::for_transaction(data, EntryStatus::Failed, observed, self.clock.now())
            }
        };

        append_entry(self.history.as_ref(), &self.collection, &entry).await;
        debug!(stage = %AttemptStage::Audited, status = entry.status.as_str(), "Attempt finished");

        result
    }

    /// Step 1. `observed` receives the balance read under the lock.
    async fn locked_update(
        &self,
        data: &TransactionData,
        observed: &mut Decimal,
    ) -> Result<Decimal, LedgerError> {
        data.kind.validate_amount(data.amount)?;

        let mut tx = self.ledger.begin().await?;

        match read_modify_write(tx.as_mut(), data, observed).await {
            Ok(new_balance) => {
                tx.commit().await?;
                Ok(new_balance)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                Err(error)
            }
        }
    }
}

async fn read_modify_write(
    tx: &mut dyn LedgerTransaction,
    data: &TransactionData,
    observed: &mut Decimal,
) -> Result<Decimal, LedgerError> {
    let balance = tx
        .lock_active_balance(&data.account_number)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFoundOrInactive(data.account_number.to_string()))?;

    *observed = balance;
    debug!(stage = %AttemptStage::LockAcquired, balance = %balance, "Row locked");

    let new_balance = data.kind.apply(balance, data.amount)?;
    tx.update_balance(&data.account_number, new_balance).await?;
    Ok(new_balance)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use banking_ledger_core::account::{AccountNumber, AccountStatus};
    use banking_ledger_core::ledger_store::StoreError;
    use banking_ledger_core::transaction::TransactionType;
    use banking_ledger_testing::{
        InMemoryHistoryStore, InMemoryLedgerStore, LedgerFailure, test_clock,
    };
    use rust_decimal_macros::dec;

    const HISTORY: &str = "transactions";

    fn a1() -> AccountNumber {
        AccountNumber::new("A1")
    }

    fn command(kind: TransactionType, amount: Decimal, id: &str) -> TransactionData {
        TransactionData {
            account_number: a1(),
            amount,
            kind,
            transaction_id: id.to_string(),
            description: None,
        }
    }

    fn processor(
        ledger: &InMemoryLedgerStore,
        history: &InMemoryHistoryStore,
    ) -> TransactionProcessor {
        TransactionProcessor::new(
            Arc::new(ledger.clone()),
            Arc::new(history.clone()),
            Arc::new(test_clock()),
        )
    }

    #[tokio::test]
    async fn deposit_then_withdrawal_records_running_balances() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        let history = InMemoryHistoryStore::new();
        let processor = processor(&ledger, &history);

        let after_deposit = processor
            .process(&command(TransactionType::Deposit, dec!(50), "t-1"))
            .await
            .unwrap();
        let after_withdrawal = processor
            .process(&command(TransactionType::Withdrawal, dec!(30), "t-2"))
            .await
            .unwrap();

        assert_eq!(after_deposit, dec!(150));
        assert_eq!(after_withdrawal, dec!(120));
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(120)));

        let entries = history.entries(HISTORY);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(LedgerEntry::is_completed));
        assert_eq!(entries[0].balance, dec!(150));
        assert_eq!(entries[1].balance, dec!(120));
        assert_eq!(entries[1].transaction_id, "t-2");
    }

    #[tokio::test]
    async fn overdraft_is_rejected_with_pre_attempt_balance() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(20)).await;
        let history = InMemoryHistoryStore::new();

        let error = processor(&ledger, &history)
            .process(&command(TransactionType::Withdrawal, dec!(25), "t-1"))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            LedgerError::InsufficientFunds {
                balance: dec!(20),
                requested: dec!(25),
            }
        );
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(20)));
        assert_eq!(ledger.stats().commits, 0);
        assert_eq!(ledger.stats().rollbacks, 1);

        let entries = history.entries(HISTORY);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Failed);
        assert_eq!(entries[0].balance, dec!(20));
    }

    #[tokio::test]
    async fn withdrawing_the_full_balance_is_allowed() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(20)).await;
        let history = InMemoryHistoryStore::new();

        let balance = processor(&ledger, &history)
            .process(&command(TransactionType::Withdrawal, dec!(20), "t-1"))
            .await
            .unwrap();

        assert_eq!(balance, dec!(0));
    }

    #[tokio::test]
    async fn non_positive_amounts_never_touch_the_store() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        let history = InMemoryHistoryStore::new();
        let processor = processor(&ledger, &history);

        let cases = [
            (TransactionType::Deposit, dec!(0), "deposit amount must be positive"),
            (TransactionType::Deposit, dec!(-5), "deposit amount must be positive"),
            (TransactionType::Withdrawal, dec!(0), "withdrawal amount must be positive"),
            (TransactionType::Withdrawal, dec!(-0.01), "withdrawal amount must be positive"),
        ];

        for (kind, amount, message) in cases {
            let error = processor
                .process(&command(kind, amount, "t"))
                .await
                .unwrap_err();
            assert!(error.is_validation());
            assert_eq!(error.to_string(), message);
        }

        assert_eq!(ledger.stats().begins, 0);
        assert_eq!(ledger.stats().locks, 0);
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(100)));
    }

    #[tokio::test]
    async fn unknown_type_is_rejected_before_store_access() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        let history = InMemoryHistoryStore::new();

        let error = processor(&ledger, &history)
            .process(&command(
                TransactionType::Unknown("TRANSFER".to_string()),
                dec!(10),
                "t-1",
            ))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "invalid transaction type: TRANSFER");
        assert_eq!(ledger.stats().begins, 0);

        let entries = history.entries(HISTORY);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Failed);
        assert_eq!(entries[0].balance, dec!(0));
    }

    #[tokio::test]
    async fn missing_account_is_reported() {
        let ledger = InMemoryLedgerStore::new();
        let history = InMemoryHistoryStore::new();

        let error = processor(&ledger, &history)
            .process(&command(TransactionType::Deposit, dec!(10), "t-1"))
            .await
            .unwrap_err();

        assert_eq!(error, LedgerError::AccountNotFoundOrInactive("A1".to_string()));
        assert_eq!(history.entries(HISTORY)[0].status, EntryStatus::Failed);
    }

    #[tokio::test]
    async fn closed_account_rejects_transactions() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        ledger.set_status(&a1(), AccountStatus::Closed).await;
        let history = InMemoryHistoryStore::new();

        let result = processor(&ledger, &history)
            .process(&command(TransactionType::Deposit, dec!(10), "t-1"))
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::AccountNotFoundOrInactive(_))
        ));
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(100)));
    }

    #[tokio::test]
    async fn commit_failure_leaves_balance_unchanged() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        ledger.fail_next(LedgerFailure::Commit);
        let history = InMemoryHistoryStore::new();

        let error = processor(&ledger, &history)
            .process(&command(TransactionType::Deposit, dec!(10), "t-1"))
            .await
            .unwrap_err();

        assert!(matches!(error, LedgerError::Store(StoreError::DatabaseError(_))));
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(100)));

        let entries = history.entries(HISTORY);
        assert_eq!(entries[0].status, EntryStatus::Failed);
        assert_eq!(entries[0].balance, dec!(100));
    }

    #[tokio::test]
    async fn update_failure_rolls_back() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        ledger.fail_next(LedgerFailure::Update);
        let history = InMemoryHistoryStore::new();

        let result = processor(&ledger, &history)
            .process(&command(TransactionType::Withdrawal, dec!(10), "t-1"))
            .await;

        assert!(result.is_err());
        assert_eq!(ledger.stats().rollbacks, 1);
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(100)));
    }

    #[tokio::test]
    async fn lock_failure_rolls_back_and_is_audited() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        ledger.fail_next(LedgerFailure::Lock);
        let history = InMemoryHistoryStore::new();

        let error = processor(&ledger, &history)
            .process(&command(TransactionType::Deposit, dec!(10), "t-1"))
            .await
            .unwrap_err();

        assert!(matches!(error, LedgerError::Store(StoreError::DatabaseError(_))));
        assert_eq!(ledger.stats().rollbacks, 1);
        assert_eq!(ledger.stats().commits, 0);
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(100)));

        let entries = history.entries(HISTORY);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Failed);
        assert_eq!(entries[0].balance, dec!(0));
    }

    #[tokio::test]
    async fn balance_overflow_is_rejected_and_audited() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", Decimal::MAX).await;
        let history = InMemoryHistoryStore::new();
        let processor = processor(&ledger, &history);

        let error = processor
            .process(&command(TransactionType::Deposit, dec!(1), "t-1"))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            LedgerError::BalanceOverflow {
                balance: Decimal::MAX,
                amount: dec!(1),
            }
        );
        assert_eq!(ledger.stats().rollbacks, 1);
        assert_eq!(ledger.balance(&a1()).await, Some(Decimal::MAX));

        let entries = history.entries(HISTORY);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Failed);
        assert_eq!(entries[0].balance, Decimal::MAX);

        // The row lock was released, so the account stays usable.
        let balance = processor
            .process(&command(TransactionType::Withdrawal, dec!(1), "t-2"))
            .await
            .unwrap();
        assert_eq!(balance, Decimal::MAX - dec!(1));
    }

    #[tokio::test]
    async fn store_unavailable_is_still_audited() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        ledger.fail_next(LedgerFailure::Begin);
        let history = InMemoryHistoryStore::new();

        let error = processor(&ledger, &history)
            .process(&command(TransactionType::Deposit, dec!(10), "t-1"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "store");
        assert_eq!(history.entries(HISTORY).len(), 1);
    }

    #[tokio::test]
    async fn audit_failure_is_swallowed() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        let history = InMemoryHistoryStore::new();
        history.fail_inserts(true);

        let balance = processor(&ledger, &history)
            .process(&command(TransactionType::Deposit, dec!(5), "t-1"))
            .await
            .unwrap();

        assert_eq!(balance, dec!(105));
        assert_eq!(ledger.balance(&a1()).await, Some(dec!(105)));
        assert_eq!(history.rejected(), 1);
    }

    #[tokio::test]
    async fn description_is_carried_into_the_entry() {
        let ledger = InMemoryLedgerStore::new();
        ledger.seed_account("A1", dec!(100)).await;
        let history = InMemoryHistoryStore::new();
        let mut data = command(TransactionType::Deposit, dec!(5), "t-1");
        data.description = Some("salary".to_string());

        processor(&ledger, &history).process(&data).await.unwrap();

        assert_eq!(
            history.entries(HISTORY)[0].description.as_deref(),
            Some("salary")
        );
    }

    #[test]
    fn stage_labels() {
        assert_eq!(AttemptStage::LockAcquired.to_string(), "LOCK_ACQUIRED");
        assert_eq!(AttemptStage::Audited.as_str(), "AUDITED");
    }
}
