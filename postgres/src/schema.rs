//! Idempotent schema bootstrap.

use crate::map_sqlx_error;
use banking_ledger_core::ledger_store::StoreError;
use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS accounts (
        account_number TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        balance NUMERIC NOT NULL CHECK (balance >= 0),
        status TEXT NOT NULL DEFAULT 'ACTIVE' CHECK (status IN ('ACTIVE', 'CLOSED')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS ledger_history (
        id BIGSERIAL PRIMARY KEY,
        collection TEXT NOT NULL,
        account_number TEXT NOT NULL,
        document JSONB NOT NULL,
        inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_ledger_history_account ON ledger_history(collection, account_number, id)",
];

/// Create the `accounts` and `ledger_history` tables if they do not exist.
///
/// Safe to run on every start. When the ledger and history stores use
/// different databases, run it against both pools.
///
/// # Errors
///
/// Returns a [`StoreError`] if any statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
    }
    tracing::debug!("Schema ensured");
    Ok(())
}
