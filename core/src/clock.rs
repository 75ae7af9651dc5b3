//! Time source injected into processors.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Processors stamp `createdAt` and ledger entry timestamps through this
/// trait so tests can substitute a fixed clock.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
