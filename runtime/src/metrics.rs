//! Prometheus metrics for the ledger pipeline.
//!
//! Counters cover the dispatcher (commands received, decode failures), both
//! processors (accounts created or failed, transactions completed or failed)
//! and the audit side channel (failed appends).
//!
//! # Example
//!
//! ```rust,no_run
//! use banking_ledger_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use banking_ledger_core::error::LedgerError;
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::counter;

/// Commands pulled off a queue, labelled by `kind`.
pub const COMMANDS_RECEIVED: &str = "ledger.commands.received";
/// Payloads that did not decode, labelled by `kind`.
pub const COMMANDS_DECODE_FAILED: &str = "ledger.commands.decode_failed";
/// Committed deposits and withdrawals, labelled by `type`.
pub const TRANSACTIONS_COMPLETED: &str = "ledger.transactions.completed";
/// Rejected transaction attempts, labelled by `type` and `reason`.
pub const TRANSACTIONS_FAILED: &str = "ledger.transactions.failed";
/// Accounts inserted.
pub const ACCOUNTS_CREATED: &str = "ledger.accounts.created";
/// Rejected account creations, labelled by `reason`.
pub const ACCOUNTS_FAILED: &str = "ledger.accounts.failed";
/// History appends that failed, labelled by entry `status`.
pub const AUDIT_WRITE_FAILED: &str = "ledger.audit.write_failed";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a tokio runtime. If another recorder is
    /// already installed (tests), this logs a warning and leaves
    /// [`handle`](Self::handle) empty.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the listener cannot be created.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started");
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(COMMANDS_RECEIVED, "Commands pulled off a queue");
    describe_counter!(COMMANDS_DECODE_FAILED, "Payloads dropped because they did not decode");
    describe_counter!(TRANSACTIONS_COMPLETED, "Deposits and withdrawals committed");
    describe_counter!(TRANSACTIONS_FAILED, "Transaction attempts that did not commit");
    describe_counter!(ACCOUNTS_CREATED, "Accounts inserted into the ledger store");
    describe_counter!(ACCOUNTS_FAILED, "Account creations that were rejected");
    describe_counter!(AUDIT_WRITE_FAILED, "Ledger entries lost because the history store failed");
}

/// Ledger metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// A payload of `kind` was received.
    pub fn command_received(kind: &'static str) {
        counter!(COMMANDS_RECEIVED, "kind" => kind).increment(1);
    }

    /// A payload of `kind` was dropped undecoded.
    pub fn decode_failed(kind: &'static str) {
        counter!(COMMANDS_DECODE_FAILED, "kind" => kind).increment(1);
    }

    /// An account row was inserted.
    pub fn account_created() {
        counter!(ACCOUNTS_CREATED).increment(1);
    }

    /// An account creation was rejected.
    pub fn account_failed(error: &LedgerError) {
        counter!(ACCOUNTS_FAILED, "reason" => error.kind()).increment(1);
    }

    /// A transaction of type `kind` committed.
    pub fn transaction_completed(kind: &str) {
        counter!(TRANSACTIONS_COMPLETED, "type" => kind.to_owned()).increment(1);
    }

    /// A transaction of type `kind` failed with `error`.
    pub fn transaction_failed(kind: &str, error: &LedgerError) {
        counter!(
            TRANSACTIONS_FAILED,
            "type" => kind.to_owned(),
            "reason" => error.kind()
        )
        .increment(1);
    }

    /// A ledger entry with `status` could not be appended.
    pub fn audit_write_failed(status: &'static str) {
        counter!(AUDIT_WRITE_FAILED, "status" => status).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_ledger_metrics_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        LedgerMetrics::command_received("transaction");
        LedgerMetrics::transaction_completed("DEPOSIT");
        LedgerMetrics::transaction_failed(
            "WITHDRAWAL",
            &LedgerError::InsufficientFunds {
                balance: Decimal::ONE,
                requested: Decimal::TEN,
            },
        );

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("ledger_commands_received"));
            assert!(rendered.contains("ledger_transactions_completed"));
            assert!(rendered.contains("insufficient_funds"));
        }
    }
}
