//! Command queue abstraction.
//!
//! The intake layer publishes JSON command payloads to named queues; workers
//! consume them. The core only relies on [`CommandQueue::consume`]; `publish`
//! exists for the intake side and for tests.
//!
//! # Delivery Semantics
//!
//! Whatever the broker provides. The reference deployment acknowledges a
//! message on receipt, so a message is considered delivered before it is
//! processed and a crash mid-processing loses it. Duplicates are possible
//! and are not detected.
//!
//! # Command kinds
//!
//! Payloads are opaque bytes. Each queue carries a single command kind;
//! [`tag`] attaches that kind to every delivery so one dispatcher can serve
//! several queues from a merged stream.

use futures::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a payload
    #[error("Publish failed for queue '{queue}': {reason}")]
    PublishFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to start consuming
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// A delivery could not be received
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of raw payloads delivered from one queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, QueueError>> + Send>>;

/// Stream of payloads tagged with their command kind.
pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<CommandEnvelope, QueueError>> + Send>>;

/// Durable delivery channel for serialized commands.
pub trait CommandQueue: Send + Sync {
    /// Publish one payload to `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::PublishFailed`] if the broker rejects the payload.
    fn publish(
        &self,
        queue: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Start consuming `queue`.
    ///
    /// The stream ends when the underlying subscription closes.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SubscriptionFailed`] if the subscription cannot
    /// be created.
    fn consume(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>>;
}

/// Which processor a payload is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Decode as `AccountData`, route to the account processor
    CreateAccount,
    /// Decode as `TransactionData`, route to the transaction processor
    Transaction,
}

impl CommandKind {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAccount => "create_account",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivered payload together with its command kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Command kind, from the queue the payload arrived on
    pub kind: CommandKind,
    /// Serialized command
    pub payload: Vec<u8>,
}

impl CommandEnvelope {
    /// Create a new envelope.
    #[must_use]
    pub const fn new(kind: CommandKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}

/// Tag every delivery of a single-kind queue with `kind`.
#[must_use]
pub fn tag(kind: CommandKind, deliveries: DeliveryStream) -> EnvelopeStream {
    Box::pin(deliveries.map(move |delivery| {
        delivery.map(|payload| CommandEnvelope::new(kind, payload))
    }))
}
