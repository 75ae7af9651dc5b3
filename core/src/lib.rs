//! # Banking Ledger Core
//!
//! Data model, error taxonomy and collaborator traits for the asynchronous
//! banking ledger.
//!
//! Account-creation and transaction commands are accepted by an intake layer,
//! placed on a durable queue, and applied later by background workers. This
//! crate holds everything those pieces agree on:
//!
//! - **Data model**: [`account::Account`], [`account::AccountData`],
//!   [`transaction::TransactionData`], [`ledger_entry::LedgerEntry`]
//! - **Errors**: [`error::LedgerError`] and the per-collaborator error types
//! - **Collaborators**: [`ledger_store::LedgerStore`] (authoritative balances),
//!   [`history_store::HistoryStore`] (append-only audit trail) and
//!   [`queue::CommandQueue`] (command delivery)
//! - **Time**: [`clock::Clock`] so processors can be tested deterministically
//!
//! ## Architecture
//!
//! ```text
//! intake ──► queue ──► dispatcher ──► processor ──► ledger store (authoritative)
//!                                          │
//!                                          └──────► history store (best effort)
//! ```
//!
//! The ledger store is the only source of truth for balances. The history
//! store receives one [`ledger_entry::LedgerEntry`] per processed command and
//! is never consulted when deciding whether a transaction is legal.
//!
//! ## Implementations
//!
//! - `banking-ledger-postgres`: `PostgresLedgerStore`, `PostgresHistoryStore`
//! - `banking-ledger-redpanda`: `RedpandaCommandQueue`
//! - `banking-ledger-testing`: in-memory versions of all three collaborators

pub mod account;
pub mod clock;
pub mod error;
pub mod history_store;
pub mod ledger_entry;
pub mod ledger_store;
pub mod queue;
pub mod transaction;

// Re-export commonly used types
pub use account::{Account, AccountData, AccountNumber, AccountStatus};
pub use chrono::{DateTime, Utc};
pub use clock::{Clock, SystemClock};
pub use error::LedgerError;
pub use history_store::{HistoryStore, HistoryStoreError};
pub use ledger_entry::{EntryStatus, LedgerEntry};
pub use ledger_store::{LedgerStore, LedgerTransaction, StoreError};
pub use queue::{CommandEnvelope, CommandKind, CommandQueue, DeliveryStream, EnvelopeStream, QueueError};
pub use rust_decimal::Decimal;
pub use transaction::{TransactionData, TransactionType};
