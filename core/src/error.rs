//! Error taxonomy for ledger processing.
//!
//! [`LedgerError`] is what a processor returns when a command does not take
//! effect. Every variant aborts the balance mutation; none of them is retried.
//! Audit-write failures are deliberately absent: a
//! [`HistoryStoreError`](crate::history_store::HistoryStoreError) is logged by
//! the processor and never surfaces here.

use crate::ledger_store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons a ledger command was rejected or could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Input failed a precondition before any write was attempted.
    ///
    /// Examples: negative initial deposit, non-positive transaction amount.
    #[error("{0}")]
    Validation(String),

    /// The submitted transaction type is neither `DEPOSIT` nor `WITHDRAWAL`.
    #[error("invalid transaction type: {0}")]
    InvalidTransactionType(String),

    /// No `ACTIVE` account row matched the account number.
    #[error("account {0} not found or inactive")]
    AccountNotFoundOrInactive(String),

    /// A withdrawal asked for more than the balance read under the row lock.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Balance at lock-acquisition time
        balance: Decimal,
        /// Requested withdrawal amount
        requested: Decimal,
    },

    /// The new balance is outside the representable range.
    #[error("balance overflow: balance {balance}, amount {amount}")]
    BalanceOverflow {
        /// Balance at lock-acquisition time
        balance: Decimal,
        /// Amount that could not be applied
        amount: Decimal,
    },

    /// The ledger store failed (connectivity, statement or commit failure).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Whether this error belongs to the validation class (rejected before
    /// any write, independent of stored state).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidTransactionType(_))
    }

    /// Short, stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidTransactionType(_) => "invalid_transaction_type",
            Self::AccountNotFoundOrInactive(_) => "account_not_found_or_inactive",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::BalanceOverflow { .. } => "balance_overflow",
            Self::Store(_) => "store",
        }
    }
}
