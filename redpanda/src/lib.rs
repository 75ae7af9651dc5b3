//! Redpanda command queue for the banking ledger.
//!
//! [`RedpandaCommandQueue`] implements [`CommandQueue`] from
//! `banking-ledger-core` on top of rdkafka. Each ledger queue
//! (`account_creator`, `transaction_processor`) is one topic; payloads are the
//! JSON bytes produced by the intake side, passed through untouched.
//!
//! # Delivery Semantics
//!
//! **Acknowledge on receipt** by default (`enable_auto_commit = true`):
//! offsets are committed by the client as messages are polled, so a message is
//! considered delivered before a worker has processed it. A crash while a
//! command is in flight loses that command.
//!
//! With `enable_auto_commit(false)` the consumer task commits each offset only
//! after the payload has been handed to the delivery stream. A crash before
//! that commit redelivers the message, and since commands are not
//! idempotent, redelivered transactions are applied again.
//!
//! # Example
//!
//! ```no_run
//! use banking_ledger_core::queue::CommandQueue;
//! use banking_ledger_redpanda::RedpandaCommandQueue;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = RedpandaCommandQueue::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("ledger-workers")
//!     .build()?;
//!
//! queue.publish("transaction_processor", br#"{"accountNumber":"A1"}"#).await?;
//!
//! let mut deliveries = queue.consume("transaction_processor").await?;
//! while let Some(payload) = deliveries.next().await {
//!     println!("{} bytes", payload?.len());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use banking_ledger_core::queue::{CommandQueue, DeliveryStream, QueueError};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_CONSUMER_GROUP: &str = "ledger-workers";
const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Command queue backed by Redpanda (or any Kafka-compatible broker).
///
/// One producer is shared by all publishes. Every call to
/// [`consume`](CommandQueue::consume) creates its own consumer in the
/// configured consumer group, so several worker processes consuming the same
/// queue share its partitions.
pub struct RedpandaCommandQueue {
    /// Kafka producer for publishing commands
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer send timeout
    timeout: Duration,
    /// Consumer group shared by all workers
    consumer_group: String,
    /// Deliveries buffered between the consumer task and the stream
    buffer_size: usize,
    /// Where a new consumer group starts reading
    auto_offset_reset: String,
    /// Commit offsets on receipt rather than after hand-off
    enable_auto_commit: bool,
}

impl RedpandaCommandQueue {
    /// Create a queue with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, QueueError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedpandaCommandQueueBuilder {
        RedpandaCommandQueueBuilder::default()
    }

    /// The bootstrap servers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// The consumer group used by [`consume`](CommandQueue::consume).
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", self.enable_auto_commit.to_string())
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        config
    }
}

/// Builder for a [`RedpandaCommandQueue`].
#[derive(Default)]
pub struct RedpandaCommandQueueBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
    enable_auto_commit: Option<bool>,
}

impl RedpandaCommandQueueBuilder {
    /// Comma-separated broker addresses, e.g. `"localhost:9092"`.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by the worker processes.
    ///
    /// Default: `"ledger-workers"`
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Deliveries buffered per subscription. Zero is treated as one.
    ///
    /// Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new consumer group starts reading: `"earliest"`, `"latest"`
    /// or `"error"`.
    ///
    /// Default: `"earliest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Whether offsets are committed on receipt.
    ///
    /// Default: `true`
    #[must_use]
    pub const fn enable_auto_commit(mut self, enabled: bool) -> Self {
        self.enable_auto_commit = Some(enabled);
        self
    }

    /// Build the [`RedpandaCommandQueue`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConnectionFailed`] if no brokers were set or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaCommandQueue, QueueError> {
        let brokers = self
            .brokers
            .ok_or_else(|| QueueError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .create()
            .map_err(|e| QueueError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let queue = RedpandaCommandQueue {
            producer,
            brokers,
            timeout,
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string()),
            enable_auto_commit: self.enable_auto_commit.unwrap_or(true),
        };

        tracing::info!(
            brokers = %queue.brokers,
            acks = %acks,
            consumer_group = %queue.consumer_group,
            buffer_size = queue.buffer_size,
            auto_offset_reset = %queue.auto_offset_reset,
            enable_auto_commit = queue.enable_auto_commit,
            "RedpandaCommandQueue created"
        );

        Ok(queue)
    }
}

impl CommandQueue for RedpandaCommandQueue {
    fn publish(
        &self,
        queue: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        let payload = payload.to_vec();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::<(), [u8]>::to(&queue).payload(payload.as_slice());

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        queue = %queue,
                        partition,
                        offset,
                        bytes = payload.len(),
                        "Command published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(queue = %queue, error = %kafka_error, "Failed to publish command");
                    Err(QueueError::PublishFailed {
                        queue,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn consume(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
        let queue = queue.to_string();
        let config = self.consumer_config();
        let buffer_size = self.buffer_size;
        let manual_commit = !self.enable_auto_commit;

        Box::pin(async move {
            let consumer: StreamConsumer =
                config.create().map_err(|e| QueueError::SubscriptionFailed {
                    queue: queue.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            consumer
                .subscribe(&[queue.as_str()])
                .map_err(|e| QueueError::SubscriptionFailed {
                    queue: queue.clone(),
                    reason: format!("Failed to subscribe: {e}"),
                })?;

            tracing::info!(
                queue = %queue,
                consumer_group = config.get("group.id").unwrap_or_default(),
                manual_commit,
                "Consuming queue"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);
            let task_queue = queue.clone();

            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(message) = stream.next().await {
                    let message = match message {
                        Ok(message) => message,
                        Err(e) => {
                            let error =
                                QueueError::TransportError(format!("Failed to receive message: {e}"));
                            if tx.send(Err(error)).await.is_err() {
                                break;
                            }
                            continue;
                        },
                    };

                    let delivery = message.payload().map(<[u8]>::to_vec).ok_or_else(|| {
                        QueueError::TransportError(format!(
                            "Message at offset {} on '{task_queue}' has no payload",
                            message.offset()
                        ))
                    });

                    tracing::trace!(
                        queue = %task_queue,
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received delivery"
                    );

                    if tx.send(delivery).await.is_err() {
                        tracing::debug!(queue = %task_queue, "Delivery stream dropped, stopping consumer");
                        break;
                    }

                    if manual_commit {
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(
                                queue = %task_queue,
                                partition = message.partition(),
                                offset = message.offset(),
                                error = %e,
                                "Failed to commit offset (message may be redelivered)"
                            );
                        }
                    }
                }

                tracing::debug!(queue = %task_queue, "Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(delivery) = rx.recv().await {
                    yield delivery;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}
