//! # Banking Ledger Testing
//!
//! Testing utilities for the banking ledger.
//!
//! This crate provides:
//! - [`InMemoryLedgerStore`]: account rows guarded by real per-row locks
//! - [`InMemoryHistoryStore`]: append-only entry log with failure injection
//! - [`InMemoryCommandQueue`]: named in-process queues
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use banking_ledger_testing::{InMemoryHistoryStore, InMemoryLedgerStore, test_clock};
//!
//! #[tokio::test]
//! async fn deposit_updates_balance() {
//!     let ledger = InMemoryLedgerStore::new();
//!     ledger.seed_account("A1", dec!(100)).await;
//!     let history = InMemoryHistoryStore::new();
//!
//!     let processor = TransactionProcessor::new(
//!         Arc::new(ledger.clone()),
//!         Arc::new(history.clone()),
//!         Arc::new(test_clock()),
//!     );
//!     // ...
//! }
//! ```

pub mod history;
pub mod ledger;
pub mod queue;

pub use history::InMemoryHistoryStore;
pub use ledger::{InMemoryLedgerStore, LedgerFailure, StoreStats};
pub use queue::InMemoryCommandQueue;

use banking_ledger_core::clock::Clock;
use chrono::{DateTime, Utc};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use banking_ledger_testing::mocks::FixedClock;
    /// use banking_ledger_core::clock::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
