//! # Banking Ledger Runtime
//!
//! The asynchronous ledger-mutation pipeline.
//!
//! ## Core Components
//!
//! - **[`Dispatcher`]**: a fixed pool of workers sharing one delivery stream,
//!   decoding each envelope by kind and routing it to a processor
//! - **[`AccountProcessor`]**: validates and inserts new accounts, then
//!   appends the opening entry
//! - **[`TransactionProcessor`]**: locked read-modify-write of one account
//!   balance, then an unconditional audit append
//! - **[`CommandPublisher`]**: intake helper that assigns ids and queues
//!   commands
//!
//! ## Example
//!
//! ```ignore
//! use banking_ledger_runtime::{AccountProcessor, Dispatcher, TransactionProcessor};
//!
//! let accounts = AccountProcessor::new(ledger.clone(), history.clone(), clock.clone());
//! let transactions = TransactionProcessor::new(ledger, history, clock);
//!
//! let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
//! let deliveries = subscribe_all(queue.as_ref(), &routes).await?;
//! let handle = Dispatcher::new(accounts, transactions)
//!     .with_workers(4)
//!     .spawn(deliveries, &shutdown_tx);
//!
//! // ...
//! shutdown_tx.send(())?;
//! handle.join().await;
//! ```

/// Account creation
pub mod account_processor;

mod audit;

/// Worker pool and command routing
pub mod dispatcher;

/// Intake helper for queuing commands
pub mod intake;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Deposits and withdrawals
pub mod transaction_processor;

pub use account_processor::AccountProcessor;
pub use dispatcher::{
    Command, DecodeError, DispatchError, Dispatcher, DispatcherHandle, Processed, subscribe_all,
};
pub use intake::{CommandPublisher, IntakeError, OpenAccountRequest, TransactionRequest};
pub use transaction_processor::{AttemptStage, TransactionProcessor};

/// History collection both processors append to unless configured otherwise.
pub const DEFAULT_HISTORY_COLLECTION: &str = "transactions";

/// Queue carrying account-creation commands.
pub const DEFAULT_ACCOUNT_QUEUE: &str = "account_creator";

/// Queue carrying transaction commands.
pub const DEFAULT_TRANSACTION_QUEUE: &str = "transaction_processor";
