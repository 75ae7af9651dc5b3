//! `PostgreSQL` ledger store.
//!
//! Balances live in the `accounts` table. The locking read is
//!
//! ```sql
//! SELECT balance FROM accounts
//! WHERE account_number = $1 AND status = 'ACTIVE'
//! FOR UPDATE
//! ```
//!
//! so a second transaction touching the same row blocks inside `PostgreSQL`
//! until the first commits or rolls back. A `sqlx::Transaction` that is
//! dropped without commit is rolled back when its connection returns to the
//! pool.

use crate::map_sqlx_error;
use banking_ledger_core::account::{Account, AccountNumber, AccountStatus};
use banking_ledger_core::ledger_store::{LedgerStore, LedgerTransaction, StoreError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::pin::Pin;

/// Ledger store backed by the `accounts` table.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Create a store from an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Set an account's status.
    ///
    /// Account closure has no command of its own; this is the hook for
    /// operators and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the update fails.
    pub async fn set_status(
        &self,
        account_number: &AccountNumber,
        status: AccountStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET status = $1 WHERE account_number = $2")
            .bind(status.as_str())
            .bind(account_number.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, StoreError> {
        let status: String = row.get("status");
        let status = AccountStatus::parse(&status)
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        let account_number: String = row.get("account_number");
        let created_at: DateTime<Utc> = row.get("created_at");

        Ok(Account {
            account_number: AccountNumber::new(account_number),
            name: row.get("name"),
            balance: row.get("balance"),
            status,
            created_at,
        })
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn begin(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn LedgerTransaction>, StoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            Ok(Box::new(PostgresLedgerTransaction { tx }) as Box<dyn LedgerTransaction>)
        })
    }

    fn insert_account(
        &self,
        account: &Account,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let account = account.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO accounts (account_number, name, balance, status, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(account.account_number.as_str())
            .bind(&account.name)
            .bind(account.balance)
            .bind(account.status.as_str())
            .bind(account.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    StoreError::DuplicateAccount(account.account_number.clone())
                }
                other => map_sqlx_error(other),
            })?;

            tracing::debug!(account_number = %account.account_number, "Account row inserted");
            metrics::counter!("ledger.store.accounts_inserted").increment(1);
            Ok(())
        })
    }

    fn find_account(
        &self,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Account>, StoreError>> + Send + '_>> {
        let account_number = account_number.clone();
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT account_number, name, balance, status, created_at
                FROM accounts
                WHERE account_number = $1
                ",
            )
            .bind(account_number.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            row.as_ref().map(Self::row_to_account).transpose()
        })
    }
}

/// One open `PostgreSQL` transaction.
pub struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

impl LedgerTransaction for PostgresLedgerTransaction {
    fn lock_active_balance(
        &mut self,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Decimal>, StoreError>> + Send + '_>> {
        let account_number = account_number.clone();
        Box::pin(async move {
            sqlx::query_scalar::<_, Decimal>(
                r"
                SELECT balance FROM accounts
                WHERE account_number = $1 AND status = 'ACTIVE'
                FOR UPDATE
                ",
            )
            .bind(account_number.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
        })
    }

    fn update_balance(
        &mut self,
        account_number: &AccountNumber,
        balance: Decimal,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let account_number = account_number.clone();
        Box::pin(async move {
            let result = sqlx::query("UPDATE accounts SET balance = $1 WHERE account_number = $2")
                .bind(balance)
                .bind(account_number.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

            if result.rows_affected() != 1 {
                return Err(StoreError::DatabaseError(format!(
                    "balance update matched {} rows for account {account_number}",
                    result.rows_affected()
                )));
            }
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> {
        Box::pin(async move { self.tx.commit().await.map_err(map_sqlx_error) })
    }

    fn rollback(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> {
        Box::pin(async move { self.tx.rollback().await.map_err(map_sqlx_error) })
    }
}
