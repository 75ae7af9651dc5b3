//! `PostgreSQL` history store.
//!
//! Ledger entries are stored as JSONB documents in one append-only table,
//! `ledger_history`, partitioned logically by a `collection` column. The
//! document keeps the entry's own field names (`transaction_id`,
//! `account_number`, `status`, ...), and `account_number` is also copied into
//! an indexed column for the read side.

use crate::map_sqlx_error;
use banking_ledger_core::account::AccountNumber;
use banking_ledger_core::history_store::{HistoryStore, HistoryStoreError};
use banking_ledger_core::ledger_entry::LedgerEntry;
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

/// Document store for [`LedgerEntry`] records.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Create a store from an existing pool.
    ///
    /// The pool may point at a different database than the ledger store.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Number of documents in `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryStoreError::QueryFailed`] if the query fails.
    pub async fn count(&self, collection: &str) -> Result<i64, HistoryStoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ledger_history WHERE collection = $1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| HistoryStoreError::QueryFailed {
                    collection: collection.to_string(),
                    reason: map_sqlx_error(e).to_string(),
                })?;
        Ok(count)
    }
}

impl HistoryStore for PostgresHistoryStore {
    fn insert(
        &self,
        collection: &str,
        entry: &LedgerEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), HistoryStoreError>> + Send + '_>> {
        let collection = collection.to_string();
        let document = serde_json::to_value(entry);
        let account_number = entry.account_number.clone();

        Box::pin(async move {
            let document =
                document.map_err(|e| HistoryStoreError::SerializationError(e.to_string()))?;

            sqlx::query(
                r"
                INSERT INTO ledger_history (collection, account_number, document)
                VALUES ($1, $2, $3)
                ",
            )
            .bind(&collection)
            .bind(account_number.as_str())
            .bind(document)
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryStoreError::InsertFailed {
                collection: collection.clone(),
                reason: e.to_string(),
            })?;

            Ok(())
        })
    }

    fn find_by_account(
        &self,
        collection: &str,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, HistoryStoreError>> + Send + '_>>
    {
        let collection = collection.to_string();
        let account_number = account_number.clone();

        Box::pin(async move {
            let documents: Vec<serde_json::Value> = sqlx::query_scalar(
                r"
                SELECT document FROM ledger_history
                WHERE collection = $1 AND account_number = $2
                ORDER BY id DESC
                ",
            )
            .bind(&collection)
            .bind(account_number.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryStoreError::QueryFailed {
                collection: collection.clone(),
                reason: e.to_string(),
            })?;

            documents
                .into_iter()
                .map(|document| {
                    serde_json::from_value(document)
                        .map_err(|e| HistoryStoreError::SerializationError(e.to_string()))
                })
                .collect()
        })
    }
}
