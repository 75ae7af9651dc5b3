//! Best-effort audit append shared by both processors.

use crate::metrics::LedgerMetrics;
use banking_ledger_core::history_store::HistoryStore;
use banking_ledger_core::ledger_entry::LedgerEntry;
use tracing::{debug, error};

/// Append `entry` to the history store.
///
/// Failures are logged and counted, never returned or retried. The caller's
/// outcome has already been decided by the ledger store.
///
/// Returns whether the append succeeded.
pub async fn append_entry(
    history: &dyn HistoryStore,
    collection: &str,
    entry: &LedgerEntry,
) -> bool {
    match history.insert(collection, entry).await {
        Ok(()) => {
            debug!(
                transaction_id = %entry.transaction_id,
                status = entry.status.as_str(),
                "Ledger entry appended"
            );
            true
        }
        Err(e) => {
            error!(
                transaction_id = %entry.transaction_id,
                account_number = %entry.account_number,
                status = entry.status.as_str(),
                collection,
                error = %e,
                "Failed to append ledger entry"
            );
            LedgerMetrics::audit_write_failed(entry.status.as_str());
            false
        }
    }
}
