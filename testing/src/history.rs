//! In-memory history store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use banking_ledger_core::account::AccountNumber;
use banking_ledger_core::history_store::{HistoryStore, HistoryStoreError};
use banking_ledger_core::ledger_entry::LedgerEntry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Inner {
    collections: RwLock<HashMap<String, Vec<LedgerEntry>>>,
    fail_inserts: AtomicBool,
    rejected: AtomicUsize,
}

/// In-memory [`HistoryStore`] that keeps entries in append order.
///
/// Inserts can be switched to fail with [`fail_inserts`](Self::fail_inserts)
/// to exercise the best-effort audit path. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    inner: Arc<Inner>,
}

impl InMemoryHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following insert fail (or succeed again with `false`).
    pub fn fail_inserts(&self, fail: bool) {
        self.inner.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Entries of `collection` in append order.
    #[must_use]
    pub fn entries(&self, collection: &str) -> Vec<LedgerEntry> {
        self.inner
            .collections
            .read()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of inserts rejected while failing.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.inner.rejected.load(Ordering::SeqCst)
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn insert(
        &self,
        collection: &str,
        entry: &LedgerEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), HistoryStoreError>> + Send + '_>> {
        let collection = collection.to_string();
        let entry = entry.clone();
        Box::pin(async move {
            if self.inner.fail_inserts.load(Ordering::SeqCst) {
                self.inner.rejected.fetch_add(1, Ordering::SeqCst);
                return Err(HistoryStoreError::InsertFailed {
                    collection,
                    reason: "history store unavailable".to_string(),
                });
            }
            self.inner
                .collections
                .write()
                .unwrap()
                .entry(collection)
                .or_default()
                .push(entry);
            Ok(())
        })
    }

    fn find_by_account(
        &self,
        collection: &str,
        account_number: &AccountNumber,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, HistoryStoreError>> + Send + '_>>
    {
        let entries: Vec<LedgerEntry> = self
            .entries(collection)
            .into_iter()
            .rev()
            .filter(|entry| &entry.account_number == account_number)
            .collect();
        Box::pin(async move { Ok(entries) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banking_ledger_core::account::AccountData;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn opening(number: &str) -> LedgerEntry {
        LedgerEntry::opening_deposit(
            &AccountData {
                account_number: AccountNumber::new(number),
                name: "Asha".to_string(),
                initial_deposit: dec!(10),
                reference_id: format!("ref-{number}"),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn find_by_account_returns_newest_first() {
        let store = InMemoryHistoryStore::new();
        store.insert("transactions", &opening("A1")).await.unwrap();
        store.insert("transactions", &opening("B2")).await.unwrap();
        let mut second = opening("A1");
        second.transaction_id = "ref-A1-second".to_string();
        store.insert("transactions", &second).await.unwrap();

        let found = store
            .find_by_account("transactions", &AccountNumber::new("A1"))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].transaction_id, "ref-A1-second");
    }

    #[tokio::test]
    async fn failing_inserts_store_nothing() {
        let store = InMemoryHistoryStore::new();
        store.fail_inserts(true);

        let result = store.insert("transactions", &opening("A1")).await;

        assert!(matches!(
            result,
            Err(HistoryStoreError::InsertFailed { .. })
        ));
        assert!(store.entries("transactions").is_empty());
        assert_eq!(store.rejected(), 1);
    }
}
