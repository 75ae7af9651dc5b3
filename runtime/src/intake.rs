//! Intake side: turn client requests into queued commands.
//!
//! The publisher assigns every identifier the processors rely on: the
//! account number (branch code followed by seven random digits) and the
//! `referenceID` / `transactionId` correlation ids (UUID v4). It then
//! serializes the command as JSON and publishes it. Nothing is validated
//! beyond what is needed to build the command; the processors enforce the
//! ledger rules.
//!
//! Account numbers are not checked for collisions here. A collision makes the
//! account insert fail with a duplicate-account store error.

use banking_ledger_core::account::{AccountData, AccountNumber};
use banking_ledger_core::queue::{CommandQueue, QueueError};
use banking_ledger_core::transaction::{TransactionData, TransactionType};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while accepting a request.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// The request cannot be turned into a command
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The command could not be serialized
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    /// The queue rejected the command
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Request to open an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAccountRequest {
    /// Account holder name
    pub name: String,
    /// Branch prefix of the account number
    pub branch_code: String,
    /// Opening balance
    pub initial_deposit: Decimal,
}

/// Request to deposit into or withdraw from an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Target account
    pub account_number: AccountNumber,
    /// Amount as submitted
    pub amount: Decimal,
    /// Operation type
    pub kind: TransactionType,
    /// Optional free text
    pub description: Option<String>,
}

/// Generate an account number: `branch_code` followed by seven digits.
#[must_use]
pub fn generate_account_number<R: Rng + ?Sized>(branch_code: &str, rng: &mut R) -> AccountNumber {
    let suffix: u32 = rng.gen_range(1_000_000..10_000_000);
    AccountNumber::new(format!("{branch_code}{suffix:07}"))
}

/// Publishes account and transaction commands to their queues.
#[derive(Clone)]
pub struct CommandPublisher {
    queue: Arc<dyn CommandQueue>,
    account_queue: String,
    transaction_queue: String,
}

impl CommandPublisher {
    /// Create a publisher for the two default queues,
    /// `account_creator` and `transaction_processor`.
    #[must_use]
    pub fn new(queue: Arc<dyn CommandQueue>) -> Self {
        Self {
            queue,
            account_queue: crate::DEFAULT_ACCOUNT_QUEUE.to_string(),
            transaction_queue: crate::DEFAULT_TRANSACTION_QUEUE.to_string(),
        }
    }

    /// Override the queue names.
    #[must_use]
    pub fn with_queues(
        mut self,
        account_queue: impl Into<String>,
        transaction_queue: impl Into<String>,
    ) -> Self {
        self.account_queue = account_queue.into();
        self.transaction_queue = transaction_queue.into();
        self
    }

    /// Accept an account-opening request.
    ///
    /// Returns the published command, which carries the assigned account
    /// number and reference id for later status polls.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::InvalidRequest`]: empty branch code
    /// - [`IntakeError::Encode`] / [`IntakeError::Queue`]: nothing was queued
    pub async fn open_account(
        &self,
        request: OpenAccountRequest,
    ) -> Result<AccountData, IntakeError> {
        let branch_code = request.branch_code.trim();
        if branch_code.is_empty() {
            return Err(IntakeError::InvalidRequest(
                "branch code is required".to_string(),
            ));
        }

        let account_number = generate_account_number(branch_code, &mut rand::thread_rng());
        let command = AccountData {
            account_number,
            name: request.name,
            initial_deposit: request.initial_deposit,
            reference_id: Uuid::new_v4().to_string(),
        };

        self.publish(&self.account_queue, &command).await?;
        tracing::info!(
            account_number = %command.account_number,
            reference_id = %command.reference_id,
            "Account creation queued"
        );
        Ok(command)
    }

    /// Accept a deposit or withdrawal request.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::Encode`] / [`IntakeError::Queue`]: nothing was queued
    pub async fn submit_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionData, IntakeError> {
        let command = TransactionData {
            account_number: request.account_number,
            amount: request.amount,
            kind: request.kind,
            transaction_id: Uuid::new_v4().to_string(),
            description: request.description,
        };

        self.publish(&self.transaction_queue, &command).await?;
        tracing::info!(
            account_number = %command.account_number,
            transaction_id = %command.transaction_id,
            kind = %command.kind,
            "Transaction queued"
        );
        Ok(command)
    }

    async fn publish<T: Serialize + Sync>(&self, queue: &str, command: &T) -> Result<(), IntakeError> {
        let payload = serde_json::to_vec(command)?;
        self.queue.publish(queue, &payload).await?;
        Ok(())
    }
}
