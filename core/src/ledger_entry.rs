//! Audit records written to the history store.

use crate::account::{AccountData, AccountNumber};
use crate::transaction::{TransactionData, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome recorded in a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// The balance mutation committed
    Completed,
    /// The command was rejected or the store failed
    Failed,
}

impl EntryStatus {
    /// Wire representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

/// One append-only audit record per processed command.
///
/// `balance` is the account balance after the operation for `COMPLETED`
/// entries, and the balance observed when the attempt failed for `FAILED`
/// ones. When a failure happens before the balance was read (validation,
/// missing account, store unavailable) it is zero.
///
/// Field names follow the history document layout (`transaction_id`,
/// `account_number`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Correlation id carried from the command
    pub transaction_id: String,
    /// Account the command targeted
    pub account_number: AccountNumber,
    /// Amount as submitted
    pub amount: Decimal,
    /// Operation type as submitted
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Outcome
    pub status: EntryStatus,
    /// Balance after the operation, or at failure
    pub balance: Decimal,
    /// When the entry was produced
    pub timestamp: DateTime<Utc>,
    /// Optional description from the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LedgerEntry {
    /// The `DEPOSIT`/`COMPLETED` entry that records an account's opening balance.
    #[must_use]
    pub fn opening_deposit(data: &AccountData, timestamp: DateTime<Utc>) -> Self {
        Self {
            transaction_id: data.reference_id.clone(),
            account_number: data.account_number.clone(),
            amount: data.initial_deposit,
            kind: TransactionType::Deposit,
            status: EntryStatus::Completed,
            balance: data.initial_deposit,
            timestamp,
            description: None,
        }
    }

    /// Entry for a transaction attempt with the given outcome.
    #[must_use]
    pub fn for_transaction(
        data: &TransactionData,
        status: EntryStatus,
        balance: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id: data.transaction_id.clone(),
            account_number: data.account_number.clone(),
            amount: data.amount,
            kind: data.kind.clone(),
            status,
            balance,
            timestamp,
            description: data.description.clone(),
        }
    }

    /// Whether the entry records a committed mutation.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opening_deposit_mirrors_account_data() {
        let data = AccountData {
            account_number: AccountNumber::new("A1"),
            name: "Asha".to_string(),
            initial_deposit: dec!(100),
            reference_id: "ref-1".to_string(),
        };
        let entry = LedgerEntry::opening_deposit(&data, Utc::now());
        assert_eq!(entry.transaction_id, "ref-1");
        assert_eq!(entry.kind, TransactionType::Deposit);
        assert!(entry.is_completed());
        assert_eq!(entry.balance, dec!(100));
    }

    #[test]
    fn document_uses_snake_case_fields() {
        let data = TransactionData {
            account_number: AccountNumber::new("A1"),
            amount: dec!(25),
            kind: TransactionType::Withdrawal,
            transaction_id: "t-1".to_string(),
            description: Some("rent".to_string()),
        };
        let entry = LedgerEntry::for_transaction(&data, EntryStatus::Failed, dec!(20), Utc::now());
        let doc = serde_json::to_value(&entry).unwrap();
        assert_eq!(doc["transaction_id"], "t-1");
        assert_eq!(doc["account_number"], "A1");
        assert_eq!(doc["type"], "WITHDRAWAL");
        assert_eq!(doc["status"], "FAILED");
        assert_eq!(doc["description"], "rent");
    }
}
