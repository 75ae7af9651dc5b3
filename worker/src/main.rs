//! Ledger worker.
//!
//! Consumes account and transaction commands from Redpanda and applies them
//! to the `PostgreSQL` ledger with a fixed pool of workers.

mod config;

use banking_ledger_core::clock::{Clock, SystemClock};
use banking_ledger_core::history_store::HistoryStore;
use banking_ledger_core::ledger_store::{LedgerStore, StoreError};
use banking_ledger_postgres::{
    PoolConfig, PostgresHistoryStore, PostgresLedgerStore, connect, ensure_schema,
};
use banking_ledger_redpanda::RedpandaCommandQueue;
use banking_ledger_runtime::metrics::MetricsServer;
use banking_ledger_runtime::retry::{RetryPolicy, retry_with_backoff};
use banking_ledger_runtime::{AccountProcessor, Dispatcher, TransactionProcessor, subscribe_all};
use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ledger_worker=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ledger worker");

    let config = Config::from_env();
    let routes = config.routes()?;
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        consumer_group = %config.redpanda.consumer_group,
        queues = ?config.queues.worker_queues,
        workers = config.worker.num_workers,
        history_collection = %config.history.collection,
        "Configuration loaded"
    );

    let _metrics_server = match config.worker.metrics_addr()? {
        Some(addr) => {
            let mut server = MetricsServer::new(addr);
            server.start()?;
            Some(server)
        },
        None => None,
    };

    let pool_config = config.postgres.pool_config();
    let ledger_pool = connect_pool("ledger-db", &config.postgres.url, &pool_config).await?;
    ensure_schema(&ledger_pool).await?;

    let history_pool = if config.history.url == config.postgres.url {
        ledger_pool.clone()
    } else {
        let pool = connect_pool("history-db", &config.history.url, &pool_config).await?;
        ensure_schema(&pool).await?;
        pool
    };

    let ledger: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::from_pool(ledger_pool));
    let history: Arc<dyn HistoryStore> = Arc::new(PostgresHistoryStore::from_pool(history_pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let accounts = AccountProcessor::new(ledger.clone(), history.clone(), clock.clone())
        .with_collection(config.history.collection.clone());
    let transactions = TransactionProcessor::new(ledger, history, clock)
        .with_collection(config.history.collection.clone());

    let queue = RedpandaCommandQueue::builder()
        .brokers(&config.redpanda.brokers)
        .consumer_group(&config.redpanda.consumer_group)
        .enable_auto_commit(config.redpanda.enable_auto_commit)
        .auto_offset_reset(&config.redpanda.auto_offset_reset)
        .build()?;
    let deliveries = subscribe_all(&queue, &routes).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = Dispatcher::new(accounts, transactions)
        .with_workers(config.worker.num_workers)
        .spawn(deliveries, &shutdown_tx);

    shutdown_signal().await?;

    if shutdown_tx.send(()).is_err() {
        debug!("Workers already stopped");
    }
    if !handle.join_timeout(config.worker.shutdown_timeout()).await {
        warn!("Shutdown timeout elapsed with commands still in flight");
    }

    info!("Ledger worker stopped");
    Ok(())
}

/// Connect to `PostgreSQL`, retrying while the server is unreachable.
async fn connect_pool(service: &str, url: &str, pool: &PoolConfig) -> Result<PgPool, StoreError> {
    retry_with_backoff(
        service,
        &RetryPolicy::default(),
        |e| matches!(e, StoreError::ConnectionFailed(_)),
        || connect(url, pool),
    )
    .await
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C signal, shutting down gracefully...");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM signal, shutting down gracefully...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C signal, shutting down gracefully...");
    }

    Ok(())
}
