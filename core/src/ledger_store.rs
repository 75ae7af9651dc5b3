//! Ledger store abstraction: the authoritative, transactional account store.
//!
//! # Design
//!
//! Balance changes follow a locked read-modify-write inside one store
//! transaction:
//!
//! ```text
//! begin ──► lock_active_balance ──► update_balance ──► commit
//!                  │                       │
//!                  └──── any failure ──────┴──► rollback
//! ```
//!
//! [`LedgerTransaction::lock_active_balance`] takes an exclusive row lock
//! scoped to one account number (`SELECT ... FOR UPDATE` semantics). A second
//! transaction asking for the same row waits until the first commits or rolls
//! back and then reads the updated balance. This lock is the only thing that
//! serializes concurrent mutations of an account; workers are not partitioned
//! by account.
//!
//! Dropping a [`LedgerTransaction`] without committing must behave like
//! [`LedgerTransaction::rollback`] so a lock is never left held.
//!
//! # Implementations
//!
//! - `PostgresLedgerStore` (in `banking-ledger-postgres`): production
//! - `InMemoryLedgerStore` (in `banking-ledger-testing`): per-row
//!   `tokio::sync::Mutex` locks for deterministic concurrency tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so that
//! processors can hold an `Arc<dyn LedgerStore>` and a
//! `Box<dyn LedgerTransaction>`.

use crate::account::{Account, AccountNumber};
use rust_decimal::Decimal;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by a ledger store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not obtain a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A statement, commit or rollback failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An account with this number already exists.
    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountNumber),
}

/// Authoritative account store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every worker.
pub trait LedgerStore: Send + Sync {
    /// Open a new store transaction.
    ///
    /// # Errors
    ///
    /// - `ConnectionFailed`: no connection could be obtained
    /// - `DatabaseError`: the transaction could not be started
    fn begin(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LedgerTransaction>, StoreError>> + Send + '_>>;

    /// Insert a new account row.
    ///
    /// This is a plain write outside any caller-visible transaction.
    ///
    /// # Errors
    ///
    /// - `DuplicateAccount`: the account number is already taken
    /// - `DatabaseError`: the insert failed
    fn insert_account(
        &self,
        account: &Account,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Load an account row without locking it.
    ///
    /// Read side only: used to poll status after asynchronous processing.
    /// Never feed the result into a balance decision.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the query failed
    fn find_account(
        &self,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Account>, StoreError>> + Send + '_>>;
}

/// One open ledger store transaction.
///
/// Consumed by [`commit`](Self::commit) or [`rollback`](Self::rollback).
pub trait LedgerTransaction: Send {
    /// Read the balance of an `ACTIVE` account and hold its row lock until
    /// the transaction ends.
    ///
    /// Returns `None` when no active account matches; no lock is held in
    /// that case.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the locking read failed
    fn lock_active_balance(
        &mut self,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Decimal>, StoreError>> + Send + '_>>;

    /// Write a new balance for an account locked by this transaction.
    ///
    /// The write becomes visible to other transactions on commit.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the update failed or the row is not locked by
    ///   this transaction
    fn update_balance(
        &mut self,
        account_number: &AccountNumber,
        balance: Decimal,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Make the transaction's writes durable and release its locks.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the commit failed; nothing was applied
    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>;

    /// Discard the transaction's writes and release its locks.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the rollback statement failed (locks are still
    ///   released when the connection is reset)
    fn rollback(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>;
}
