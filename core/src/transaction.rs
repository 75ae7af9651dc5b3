//! Deposit and withdrawal commands and the balance arithmetic that decides
//! whether they are legal.

use crate::account::AccountNumber;
use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of balance-changing operation.
///
/// Unknown type strings are kept as [`TransactionType::Unknown`] instead of
/// failing to decode, so that the processor can reject them with
/// [`LedgerError::InvalidTransactionType`] and still record a `FAILED`
/// ledger entry for the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionType {
    /// Credit the account
    Deposit,
    /// Debit the account, only if funds are sufficient
    Withdrawal,
    /// Any other submitted type string
    Unknown(String),
}

impl TransactionType {
    /// Wire representation of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Unknown(raw) => raw,
        }
    }

    /// Reject anything that is not a known type or a strictly positive amount.
    ///
    /// This check needs no store access, so the processor runs it before
    /// opening a transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTransactionType`] for an unknown type
    /// - [`LedgerError::Validation`] for `amount <= 0`
    pub fn validate_amount(&self, amount: Decimal) -> Result<(), LedgerError> {
        match self {
            Self::Deposit if amount <= Decimal::ZERO => Err(LedgerError::Validation(
                "deposit amount must be positive".to_string(),
            )),
            Self::Withdrawal if amount <= Decimal::ZERO => Err(LedgerError::Validation(
                "withdrawal amount must be positive".to_string(),
            )),
            Self::Unknown(raw) => Err(LedgerError::InvalidTransactionType(raw.clone())),
            _ => Ok(()),
        }
    }

    /// Compute the balance after applying `amount` to `balance`.
    ///
    /// `balance` must be the value read under the account's row lock.
    ///
    /// # Errors
    ///
    /// - Everything [`validate_amount`](Self::validate_amount) rejects
    /// - [`LedgerError::InsufficientFunds`] when a withdrawal exceeds `balance`
    /// - [`LedgerError::BalanceOverflow`] when the result does not fit in a
    ///   [`Decimal`]
    ///
    /// # Examples
    ///
    /// ```
    /// use banking_ledger_core::transaction::TransactionType;
    /// use rust_decimal::Decimal;
    ///
    /// let balance = Decimal::new(100, 0);
    /// let after = TransactionType::Deposit.apply(balance, Decimal::new(50, 0)).unwrap();
    /// assert_eq!(after, Decimal::new(150, 0));
    ///
    /// assert!(TransactionType::Withdrawal.apply(balance, Decimal::new(101, 0)).is_err());
    /// ```
    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.validate_amount(amount)?;
        let applied = match self {
            Self::Deposit => balance.checked_add(amount),
            Self::Withdrawal => {
                if balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        balance,
                        requested: amount,
                    });
                }
                balance.checked_sub(amount)
            }
            Self::Unknown(raw) => return Err(LedgerError::InvalidTransactionType(raw.clone())),
        };
        applied.ok_or(LedgerError::BalanceOverflow { balance, amount })
    }
}

impl From<String> for TransactionType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "DEPOSIT" => Self::Deposit,
            "WITHDRAWAL" => Self::Withdrawal,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<TransactionType> for String {
    fn from(kind: TransactionType) -> Self {
        match kind {
            TransactionType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queued command asking a worker to apply one deposit or withdrawal.
///
/// `transaction_id` is minted once by the intake layer and carried unchanged
/// into the ledger entry. It is a correlation key only; duplicates are not
/// detected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionData {
    /// Target account
    pub account_number: AccountNumber,
    /// Amount as submitted
    pub amount: Decimal,
    /// Deposit or withdrawal
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Correlation id assigned at command creation
    pub transaction_id: String,
    /// Free-text description copied into the ledger entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
