//! History store abstraction: the append-only audit trail.
//!
//! Every processed command appends exactly one [`LedgerEntry`]. Appends are
//! best effort: they are not transactional with the ledger mutation, are not
//! locked, and may be lost, duplicated or reordered relative to it. The
//! history store is never a source of truth for balances.
//!
//! There is no update or delete path.

use crate::account::AccountNumber;
use crate::ledger_entry::LedgerEntry;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by a history store (the audit-write error class).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryStoreError {
    /// Could not reach the store.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The insert was rejected or failed.
    #[error("Insert into '{collection}' failed: {reason}")]
    InsertFailed {
        /// Target collection
        collection: String,
        /// The reason for failure
        reason: String,
    },

    /// A read query failed.
    #[error("Query on '{collection}' failed: {reason}")]
    QueryFailed {
        /// Queried collection
        collection: String,
        /// The reason for failure
        reason: String,
    },

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Append-only store of [`LedgerEntry`] documents, grouped in named
/// collections.
pub trait HistoryStore: Send + Sync {
    /// Append one entry to `collection`.
    ///
    /// # Errors
    ///
    /// - `InsertFailed` / `ConnectionFailed`: the append did not happen
    /// - `SerializationError`: the entry could not be encoded
    fn insert(
        &self,
        collection: &str,
        entry: &LedgerEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), HistoryStoreError>> + Send + '_>>;

    /// All entries for one account, newest first.
    ///
    /// Read side only.
    ///
    /// # Errors
    ///
    /// - `QueryFailed`: the query failed
    /// - `SerializationError`: a stored document could not be decoded
    fn find_by_account(
        &self,
        collection: &str,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, HistoryStoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_failed_display() {
        let error = HistoryStoreError::InsertFailed {
            collection: "transactions".to_string(),
            reason: "timeout".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("transactions"));
        assert!(display.contains("timeout"));
    }
}
