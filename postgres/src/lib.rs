//! `PostgreSQL` stores for the banking ledger.
//!
//! This crate provides:
//!
//! - [`PostgresLedgerStore`]: the authoritative `accounts` table, with
//!   `SELECT ... FOR UPDATE` row locking for balance changes
//! - [`PostgresHistoryStore`]: append-only JSONB documents for ledger entries
//! - [`connect`] / [`PoolConfig`]: pool setup with a server-side statement
//!   timeout
//! - [`ensure_schema`]: idempotent table creation
//!
//! # Example
//!
//! ```ignore
//! use banking_ledger_postgres::{PoolConfig, PostgresLedgerStore, connect, ensure_schema};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/ledger", &PoolConfig::default()).await?;
//!     ensure_schema(&pool).await?;
//!     let ledger = PostgresLedgerStore::from_pool(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod history_store;
mod ledger_store;
mod schema;

pub use history_store::PostgresHistoryStore;
pub use ledger_store::{PostgresLedgerStore, PostgresLedgerTransaction};
pub use schema::ensure_schema;

use banking_ledger_core::ledger_store::StoreError;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
    /// Server-side `statement_timeout`; the only deadline on a ledger
    /// transaction's statements
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(60),
        }
    }
}

/// Open a connection pool and check it with one round-trip.
///
/// # Errors
///
/// - [`StoreError::ConnectionFailed`]: the URL is invalid or the server
///   cannot be reached
pub async fn connect(database_url: &str, config: &PoolConfig) -> Result<PgPool, StoreError> {
    let statement_timeout = format!("{}ms", config.statement_timeout.as_millis());
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
        .options([("statement_timeout", statement_timeout.as_str())]);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

    tracing::info!(
        max_connections = config.max_connections,
        statement_timeout = %statement_timeout,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Classify a sqlx error as a connectivity or statement failure.
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::ConnectionFailed(error.to_string()),
        other => StoreError::DatabaseError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_connection_failures() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::ConnectionFailed(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::DatabaseError(_)
        ));
    }

    #[test]
    fn default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.statement_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn invalid_url_is_a_connection_failure() {
        let result = connect("not a url", &PoolConfig::default()).await;
        assert!(matches!(result, Err(StoreError::ConnectionFailed(_))));
    }
}
