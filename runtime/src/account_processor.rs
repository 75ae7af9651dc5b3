//! Account creation.
//!
//! ```text
//! validate ──► insert account row ──► append opening DEPOSIT entry
//!    │                │                        │
//!    └─ Validation    └─ Store error           └─ logged, never returned
//! ```
//!
//! The insert and the audit append are two independent writes. Ordering is
//! what keeps partial state out: when the insert fails nothing is appended.

use crate::audit::append_entry;
use crate::metrics::LedgerMetrics;
use banking_ledger_core::account::{Account, AccountData};
use banking_ledger_core::clock::Clock;
use banking_ledger_core::error::LedgerError;
use banking_ledger_core::history_store::HistoryStore;
use banking_ledger_core::ledger_entry::LedgerEntry;
use banking_ledger_core::ledger_store::LedgerStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates accounts from [`AccountData`] commands.
#[derive(Clone)]
pub struct AccountProcessor {
    ledger: Arc<dyn LedgerStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    collection: String,
}

impl AccountProcessor {
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

    /// Open an account with `status = ACTIVE` and `balance = initialDeposit`.
    ///
    /// The account number must already be assigned. A failed audit append is
    /// logged and does not fail the call.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`]: negative initial deposit, nothing written
    /// - [`LedgerError::Store`]: the insert failed (including a duplicate
    ///   account number), nothing appended
    #[tracing::instrument(
        name = "create_account",
        skip(self, data),
        fields(account_number = %data.account_number, reference_id = %data.reference_id)
    )]
    pub async fn process(&self, data: &AccountData) -> Result<Account, LedgerError> {
        if let Err(error) = data.validate() {
            warn!(error = %error, "Rejected account creation");
            LedgerMetrics::account_failed(&error);
            return Err(error);
        }

        let now = self.clock.now();
        let account = Account::open(data, now);

        if let Err(error) = self.ledger.insert_account(&account).await {
            warn!(error = %error, "Failed to insert account");
            let error = LedgerError::from(error);
            LedgerMetrics::account_failed(&error);
            return Err(error);
        }

        LedgerMetrics::account_created();
        info!(balance = %account.balance, "Account created");

        let entry = LedgerEntry::opening_deposit(data, now);
        append_entry(self.history.as_ref(), &self.collection, &entry).await;

        Ok(account)
    }
}
