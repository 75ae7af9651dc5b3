//! Worker pool draining one shared delivery stream.
//!
//! # Pattern
//!
//! ```text
//!             ┌──────────► worker 0 ──┐
//! deliveries ─┼──────────► worker 1 ──┼──► AccountProcessor | TransactionProcessor
//! (one lock)  └──────────► worker W ──┘
//! ```
//!
//! `W` tasks share the receive side of a single [`EnvelopeStream`]. A worker
//! takes the next envelope, decodes it by kind, runs the matching processor
//! to completion, then goes back for the next one. Workers are not
//! partitioned by account: two commands for the same account may run on two
//! workers at once, and the ledger store's row lock is what serializes them.
//!
//! Payloads that do not decode are logged and dropped. Processor failures
//! are logged; there is no caller to report them to.
//!
//! # Shutdown
//!
//! Workers watch a `broadcast` shutdown signal while waiting for the next
//! envelope. A command already being processed always runs to completion.

use crate::account_processor::AccountProcessor;
use crate::metrics::LedgerMetrics;
use crate::transaction_processor::TransactionProcessor;
use banking_ledger_core::account::{Account, AccountData};
use banking_ledger_core::error::LedgerError;
use banking_ledger_core::queue::{CommandEnvelope, CommandKind, CommandQueue, EnvelopeStream, QueueError, tag};
use banking_ledger_core::transaction::TransactionData;
use futures::StreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 4;

/// A payload that is not a valid command of its kind.
#[derive(Error, Debug)]
#[error("Failed to decode {kind} command: {source}")]
pub struct DecodeError {
    /// Kind the payload was expected to be
    pub kind: CommandKind,
    /// Underlying JSON error
    #[source]
    pub source: serde_json::Error,
}

/// Why a delivered envelope did not take effect.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The payload was dropped undecoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The processor rejected the command
    #[error(transparent)]
    Rejected(#[from] LedgerError),
}

/// A command decoded from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open an account
    CreateAccount(AccountData),
    /// Deposit or withdraw
    Transaction(TransactionData),
}

impl Command {
    /// Decode `envelope.payload` as the shape its kind calls for.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the JSON is malformed or has any field
    /// missing, mistyped or unexpected.
    pub fn decode(envelope: &CommandEnvelope) -> Result<Self, DecodeError> {
        let decoded = match envelope.kind {
            CommandKind::CreateAccount => {
                serde_json::from_slice(&envelope.payload).map(Self::CreateAccount)
            }
            CommandKind::Transaction => {
                serde_json::from_slice(&envelope.payload).map(Self::Transaction)
            }
        };
        decoded.map_err(|source| DecodeError {
            kind: envelope.kind,
            source,
        })
    }
}

/// Result of a successfully processed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// The account row was inserted
    AccountCreated(Account),
    /// The transaction committed with this balance
    TransactionApplied(Decimal),
}

/// Routes decoded commands to the two processors.
pub struct Dispatcher {
    accounts: AccountProcessor,
    transactions: TransactionProcessor,
    workers: usize,
}

impl Dispatcher {
    /// Create a dispatcher running [`DEFAULT_WORKERS`] workers.
    #[must_use]
    pub const fn new(accounts: AccountProcessor, transactions: TransactionProcessor) -> Self {
        Self {
            accounts,
            transactions,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Set the worker count. Zero is raised to one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Number of workers [`spawn`](Self::spawn) starts.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Decode one envelope and run it through its processor.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Decode`]: the payload was not a valid command
    /// - [`DispatchError::Rejected`]: the processor returned an error
    pub async fn dispatch(&self, envelope: &CommandEnvelope) -> Result<Processed, DispatchError> {
        LedgerMetrics::command_received(envelope.kind.as_str());

        let command = Command::decode(envelope).inspect_err(|_| {
            LedgerMetrics::decode_failed(envelope.kind.as_str());
        })?;

        let processed = match command {
            Command::CreateAccount(data) => {
                Processed::AccountCreated(self.accounts.process(&data).await?)
            }
            Command::Transaction(data) => {
                Processed::TransactionApplied(self.transactions.process(&data).await?)
            }
        };
        Ok(processed)
    }

    /// Start the worker pool on `deliveries`.
    ///
    /// Workers stop when `shutdown` fires or the stream ends.
    #[must_use]
    pub fn spawn(
        self,
        deliveries: EnvelopeStream,
        shutdown: &broadcast::Sender<()>,
    ) -> DispatcherHandle {
        let workers = self.workers;
        let dispatcher = Arc::new(self);
        let deliveries = Arc::new(Mutex::new(deliveries));

        let handles = (0..workers)
            .map(|worker_id| {
                let dispatcher = Arc::clone(&dispatcher);
                let deliveries = Arc::clone(&deliveries);
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move {
                    dispatcher.worker_loop(worker_id, deliveries, shutdown).await;
                })
            })
            .collect();

        info!(workers, "Dispatcher started");
        DispatcherHandle { handles }
    }

    async fn worker_loop(
        &self,
        worker_id: usize,
        deliveries: Arc<Mutex<EnvelopeStream>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        debug!(worker_id, "Worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!(worker_id, "Worker received shutdown signal");
                    break;
                }
                next = next_delivery(&deliveries) => next,
            };

            match next {
                Some(Ok(envelope)) => self.handle(worker_id, &envelope).await,
                Some(Err(e)) => {
                    error!(worker_id, error = %e, "Error receiving command from queue");
                }
                None => {
                    info!(worker_id, "Delivery stream ended");
                    break;
                }
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    async fn handle(&self, worker_id: usize, envelope: &CommandEnvelope) {
        match self.dispatch(envelope).await {
            Ok(Processed::AccountCreated(account)) => {
                debug!(worker_id, account_number = %account.account_number, "Account command done");
            }
            Ok(Processed::TransactionApplied(balance)) => {
                debug!(worker_id, balance = %balance, "Transaction command done");
            }
            Err(DispatchError::Decode(e)) => {
                error!(
                    worker_id,
                    kind = %e.kind,
                    bytes = envelope.payload.len(),
                    error = %e,
                    "Dropping undecodable command"
                );
            }
            Err(DispatchError::Rejected(e)) => {
                warn!(
                    worker_id,
                    kind = %envelope.kind,
                    reason = e.kind(),
                    error = %e,
                    "Command did not take effect"
                );
            }
        }
    }
}

async fn next_delivery(
    deliveries: &Mutex<EnvelopeStream>,
) -> Option<Result<CommandEnvelope, QueueError>> {
    deliveries.lock().await.next().await
}

/// Join handle for a running worker pool.
pub struct DispatcherHandle {
    handles: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Number of workers started.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
    }

    /// Wait for every worker to stop, giving up after `timeout`.
    ///
    /// Returns `true` if all workers stopped in time.
    pub async fn join_timeout(self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.join()).await.is_ok() {
            info!("All workers stopped");
            true
        } else {
            warn!(
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Workers did not stop before the shutdown timeout"
            );
            false
        }
    }
}

/// Subscribe to every `(queue, kind)` route and merge the deliveries.
///
/// # Errors
///
/// Returns the first subscription error.
pub async fn subscribe_all(
    queue: &dyn CommandQueue,
    routes: &[(String, CommandKind)],
) -> Result<EnvelopeStream, QueueError> {
    let mut streams = Vec::with_capacity(routes.len());
    for (name, kind) in routes {
        let deliveries = queue.consume(name).await?;
        info!(queue = %name, kind = %kind, "Subscribed to queue");
        streams.push(tag(*kind, deliveries));
    }
    Ok(Box::pin(futures::stream::select_all(streams)))
}
