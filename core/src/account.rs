//! Account types: the authoritative account row and the creation command.
//!
//! An [`Account`] lives in the ledger store and is the only place a balance is
//! kept. [`AccountData`] is the queued command that asks a worker to create
//! one; its account number has already been assigned by the intake layer.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `AccountNumber` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid account number: {0}")]
pub struct ParseAccountNumberError(String);

/// Globally unique, immutable account identifier.
///
/// Account numbers are assigned once at creation time by the intake layer
/// (branch code followed by seven digits, e.g. `"BLR1234567"`) and never
/// change afterwards.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings
/// - `From::from()` and `new()`: no validation (trusted input)
///
/// # Examples
///
/// ```
/// use banking_ledger_core::account::AccountNumber;
///
/// let number = AccountNumber::new("BLR1234567");
/// assert_eq!(number.as_str(), "BLR1234567");
///
/// let parsed: AccountNumber = "A1".parse().unwrap();
/// assert_eq!(parsed, AccountNumber::new("A1"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Create a new `AccountNumber` from a string.
    #[must_use]
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get the account number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `AccountNumber` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = ParseAccountNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAccountNumberError(
                "Account number cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for AccountNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AccountNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of an account.
///
/// Only `Active` accounts accept deposits and withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    /// Account accepts transactions
    Active,
    /// Account is closed; every transaction against it is rejected
    Closed,
}

impl AccountStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }

    /// Parse status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(LedgerError::Validation(format!(
                "invalid account status: {s}"
            ))),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account row as held by the ledger store.
///
/// The core never caches an `Account` between operations: every balance that
/// feeds a decision is read inside the store transaction that mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique account identifier
    pub account_number: AccountNumber,
    /// Account holder name
    pub name: String,
    /// Current balance, never negative once committed
    pub balance: Decimal,
    /// Lifecycle status
    pub status: AccountStatus,
    /// When the account row was created
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Build the initial row for an account-creation command.
    ///
    /// The new account is `Active` and its balance is the initial deposit.
    #[must_use]
    pub fn open(data: &AccountData, created_at: DateTime<Utc>) -> Self {
        Self {
            account_number: data.account_number.clone(),
            name: data.name.clone(),
            balance: data.initial_deposit,
            status: AccountStatus::Active,
            created_at,
        }
    }

    /// Whether this account currently accepts transactions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Queued command asking a worker to create an account.
///
/// Field names on the wire match the intake layer's JSON exactly; any other
/// shape fails to decode.
///
/// # Example
///
/// ```
/// use banking_ledger_core::account::AccountData;
///
/// let json = r#"{
///     "accountNumber": "BLR1234567",
///     "name": "Asha",
///     "initialDeposit": 100.50,
///     "referenceID": "ref-1"
/// }"#;
/// let data: AccountData = serde_json::from_str(json).unwrap();
/// assert_eq!(data.account_number.as_str(), "BLR1234567");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountData {
    /// Account number, already assigned upstream
    pub account_number: AccountNumber,
    /// Account holder name
    pub name: String,
    /// Opening balance; must not be negative
    pub initial_deposit: Decimal,
    /// Correlation id for the opening deposit's ledger entry
    #[serde(rename = "referenceID", alias = "referenceId")]
    pub reference_id: String,
}

impl AccountData {
    /// Check the creation preconditions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] with the message
    /// `"initial Deposit cannot be negative"` when the deposit is below zero.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.initial_deposit < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "initial Deposit cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account_data(initial_deposit: Decimal) -> AccountData {
        AccountData {
            account_number: AccountNumber::new("A1"),
            name: "Asha".to_string(),
            initial_deposit,
            reference_id: "ref-1".to_string(),
        }
    }

    #[test]
    fn account_number_rejects_empty() {
        assert!("".parse::<AccountNumber>().is_err());
        assert_eq!(
            "A1".parse::<AccountNumber>().unwrap(),
            AccountNumber::new("A1")
        );
    }

    #[test]
    fn account_status_parse() {
        assert_eq!(AccountStatus::parse("ACTIVE").unwrap(), AccountStatus::Active);
        assert_eq!(AccountStatus::parse("CLOSED").unwrap(), AccountStatus::Closed);
        assert!(AccountStatus::parse("active").is_err());
    }

    #[test]
    fn negative_initial_deposit_is_rejected() {
        let err = account_data(dec!(-1)).validate().unwrap_err();
        assert_eq!(err.to_string(), "initial Deposit cannot be negative");
    }

    #[test]
    fn zero_initial_deposit_is_allowed() {
        assert!(account_data(dec!(0)).validate().is_ok());
    }

    #[test]
    fn open_builds_active_account() {
        let now = Utc::now();
        let account = Account::open(&account_data(dec!(250.75)), now);
        assert!(account.is_active());
        assert_eq!(account.balance, dec!(250.75));
        assert_eq!(account.created_at, now);
    }

    #[test]
    fn decodes_wire_shape_with_numeric_deposit() {
        let json = r#"{"accountNumber":"A1","name":"Asha","initialDeposit":100,"referenceID":"r"}"#;
        let data: AccountData = serde_json::from_str(json).unwrap();
        assert_eq!(data.initial_deposit, dec!(100));
        assert_eq!(data.reference_id, "r");
    }

    #[test]
    fn unknown_fields_fail_to_decode() {
        let json = r#"{"accountNumber":"A1","name":"Asha","initialDeposit":1,"referenceID":"r","branchCode":"BLR"}"#;
        assert!(serde_json::from_str::<AccountData>(json).is_err());
    }

    #[test]
    fn missing_fields_fail_to_decode() {
        let json = r#"{"accountNumber":"A1","initialDeposit":1}"#;
        assert!(serde_json::from_str::<AccountData>(json).is_err());
    }
}
