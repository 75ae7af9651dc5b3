//! In-memory ledger store with real row locks.
//!
//! Each account row sits behind its own `tokio::sync::Mutex`. A transaction
//! that reads a balance with [`LedgerTransaction::lock_active_balance`] keeps
//! the owned guard until it commits, rolls back or is dropped, so two
//! transactions on the same account serialize exactly like
//! `SELECT ... FOR UPDATE` in `PostgreSQL`. Balance writes are staged in the
//! transaction and only reach the row on commit.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use banking_ledger_core::account::{Account, AccountNumber, AccountStatus};
use banking_ledger_core::ledger_store::{LedgerStore, LedgerTransaction, StoreError};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

/// Store operation that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerFailure {
    /// `begin()` fails with `ConnectionFailed`
    Begin,
    /// `lock_active_balance()` fails with `DatabaseError`
    Lock,
    /// `update_balance()` fails with `DatabaseError`
    Update,
    /// `commit()` fails with `DatabaseError` and nothing is applied
    Commit,
    /// `insert_account()` fails with `DatabaseError`
    Insert,
}

/// Counters of store calls, for asserting which round-trips happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Transactions opened
    pub begins: usize,
    /// Row locks acquired on active accounts
    pub locks: usize,
    /// Transactions committed
    pub commits: usize,
    /// Transactions rolled back explicitly
    pub rollbacks: usize,
    /// Account rows inserted
    pub inserts: usize,
}

impl StoreStats {
    /// Number of calls that wrote to the store.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.inserts + self.commits
    }
}

#[derive(Default)]
struct Counters {
    begins: AtomicUsize,
    locks: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    inserts: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    rows: RwLock<HashMap<AccountNumber, Arc<RowLock<Account>>>>,
    failures: Mutex<HashSet<LedgerFailure>>,
    counters: Counters,
}

impl Inner {
    fn row(&self, account_number: &AccountNumber) -> Option<Arc<RowLock<Account>>> {
        self.rows.read().unwrap().get(account_number).cloned()
    }

    fn take_failure(&self, failure: LedgerFailure) -> bool {
        self.failures.lock().unwrap().remove(&failure)
    }
}

/// In-memory [`LedgerStore`] for fast, deterministic tests.
///
/// Cloning shares the same rows.
///
/// # Example
///
/// ```
/// use banking_ledger_testing::InMemoryLedgerStore;
/// use banking_ledger_core::account::AccountNumber;
/// use rust_decimal::Decimal;
///
/// # async fn example() {
/// let store = InMemoryLedgerStore::new();
/// store.seed_account("A1", Decimal::new(100, 0)).await;
/// assert_eq!(store.balance(&AccountNumber::new("A1")).await, Some(Decimal::new(100, 0)));
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
}

impl InMemoryLedgerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an `ACTIVE` account directly, bypassing counters.
    pub async fn seed_account(&self, account_number: impl Into<AccountNumber>, balance: Decimal) {
        let account_number = account_number.into();
        let account = Account {
            account_number: account_number.clone(),
            name: format!("holder of {account_number}"),
            balance,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };
        self.inner
            .rows
            .write()
            .unwrap()
            .insert(account_number, Arc::new(RowLock::new(account)));
    }

    /// Set an account's status, waiting for any transaction holding its lock.
    pub async fn set_status(&self, account_number: &AccountNumber, status: AccountStatus) {
        if let Some(row) = self.inner.row(account_number) {
            row.lock().await.status = status;
        }
    }

    /// Committed balance of an account, waiting for any in-flight lock holder.
    pub async fn balance(&self, account_number: &AccountNumber) -> Option<Decimal> {
        let row = self.inner.row(account_number)?;
        let account = row.lock().await;
        Some(account.balance)
    }

    /// Make the next call of the given operation fail.
    pub fn fail_next(&self, failure: LedgerFailure) {
        self.inner.failures.lock().unwrap().insert(failure);
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            begins: c.begins.load(Ordering::SeqCst),
            locks: c.locks.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            inserts: c.inserts.load(Ordering::SeqCst),
        }
    }

    /// Number of account rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.rows.read().unwrap().len()
    }

    /// Whether the store holds no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn begin(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LedgerTransaction>, StoreError>> + Send + '_>>
    {
        Box::pin(async move {
            if self.inner.take_failure(LedgerFailure::Begin) {
                return Err(StoreError::ConnectionFailed(
                    "injected begin failure".to_string(),
                ));
            }
            self.inner.counters.begins.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(InMemoryTransaction {
                store: Arc::clone(&self.inner),
                locked: HashMap::new(),
            }) as Box<dyn LedgerTransaction>)
        })
    }

    fn insert_account(
        &self,
        account: &Account,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let account = account.clone();
        Box::pin(async move {
            if self.inner.take_failure(LedgerFailure::Insert) {
                return Err(StoreError::DatabaseError(
                    "injected insert failure".to_string(),
                ));
            }
            let mut rows = self.inner.rows.write().unwrap();
            if rows.contains_key(&account.account_number) {
                return Err(StoreError::DuplicateAccount(account.account_number));
            }
            rows.insert(
                account.account_number.clone(),
                Arc::new(RowLock::new(account)),
            );
            self.inner.counters.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn find_account(
        &self,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Account>, StoreError>> + Send + '_>> {
        let row = self.inner.row(account_number);
        Box::pin(async move {
            match row {
                Some(row) => Ok(Some(row.lock().await.clone())),
                None => Ok(None),
            }
        })
    }
}

struct LockedRow {
    guard: OwnedMutexGuard<Account>,
    staged: Option<Decimal>,
}

struct InMemoryTransaction {
    store: Arc<Inner>,
    locked: HashMap<AccountNumber, LockedRow>,
}

impl LedgerTransaction for InMemoryTransaction {
    fn lock_active_balance(
        &mut self,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Decimal>, StoreError>> + Send + '_>> {
        let account_number = account_number.clone();
        Box::pin(async move {
            if self.store.take_failure(LedgerFailure::Lock) {
                return Err(StoreError::DatabaseError(
                    "injected lock failure".to_string(),
                ));
            }
            if let Some(row) = self.locked.get(&account_number) {
                return Ok(Some(row.staged.unwrap_or(row.guard.balance)));
            }
            let Some(row) = self.store.row(&account_number) else {
                return Ok(None);
            };
            let guard = row.lock_owned().await;
            if guard.status != AccountStatus::Active {
                return Ok(None);
            }
            let balance = guard.balance;
            self.store.counters.locks.fetch_add(1, Ordering::SeqCst);
            self.locked.insert(
                account_number,
                LockedRow {
                    guard,
                    staged: None,
                },
            );
            Ok(Some(balance))
        })
    }

    fn update_balance(
        &mut self,
        account_number: &AccountNumber,
        balance: Decimal,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let account_number = account_number.clone();
        Box::pin(async move {
            if self.store.take_failure(LedgerFailure::Update) {
                return Err(StoreError::DatabaseError(
                    "injected update failure".to_string(),
                ));
            }
            let row = self.locked.get_mut(&account_number).ok_or_else(|| {
                StoreError::DatabaseError(format!(
                    "account {account_number} is not locked by this transaction"
                ))
            })?;
            row.staged = Some(balance);
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> {
        Box::pin(async move {
            let this = *self;
            if this.store.take_failure(LedgerFailure::Commit) {
                // Locks release as `this` drops; staged writes are discarded.
                return Err(StoreError::DatabaseError(
                    "injected commit failure".to_string(),
                ));
            }
            for (_, mut row) in this.locked {
                if let Some(balance) = row.staged {
                    row.guard.balance = balance;
                }
            }
            this.store.counters.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> {
        Box::pin(async move {
            self.store.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
