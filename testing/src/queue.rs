//! In-process command queues.
//!
//! Each named queue is an unbounded channel. Payloads published before a
//! consumer subscribes are buffered. A queue has a single consumer, like a
//! consumer group with one member; [`InMemoryCommandQueue::close`] ends its
//! stream so a dispatcher drains and exits.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use banking_ledger_core::queue::{CommandQueue, DeliveryStream, QueueError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Channel {
    sender: Option<mpsc::UnboundedSender<Vec<u8>>>,
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Channel {
    fn open() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }
}

/// In-memory [`CommandQueue`]. Cloning shares the same queues.
#[derive(Clone, Default)]
pub struct InMemoryCommandQueue {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
}

impl InMemoryCommandQueue {
    /// Create a queue set with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Close `queue`: no more publishes, consumers see the end of stream
    /// once buffered payloads are drained.
    pub fn close(&self, queue: &str) {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(queue.to_string())
            .or_insert_with(Channel::open)
            .sender = None;
    }

    /// Payloads published to `queue` that nobody has consumed yet.
    ///
    /// Only meaningful before a consumer has subscribed.
    #[must_use]
    pub fn pending(&self, queue: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(queue)
            .and_then(|channel| channel.receiver.as_ref())
            .map_or(0, mpsc::UnboundedReceiver::len)
    }
}

impl CommandQueue for InMemoryCommandQueue {
    fn publish(
        &self,
        queue: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let result = {
            let mut channels = self.channels.lock().unwrap();
            let channel = channels
                .entry(queue.to_string())
                .or_insert_with(Channel::open);
            match &channel.sender {
                Some(sender) => sender
                    .send(payload.to_vec())
                    .map_err(|_| QueueError::PublishFailed {
                        queue: queue.to_string(),
                        reason: "consumer dropped".to_string(),
                    }),
                None => Err(QueueError::PublishFailed {
                    queue: queue.to_string(),
                    reason: "queue closed".to_string(),
                }),
            }
        };
        Box::pin(async move { result })
    }

    fn consume(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
        let receiver = {
            let mut channels = self.channels.lock().unwrap();
            channels
                .entry(queue.to_string())
                .or_insert_with(Channel::open)
                .receiver
                .take()
        };
        let queue = queue.to_string();
        Box::pin(async move {
            let Some(mut receiver) = receiver else {
                return Err(QueueError::SubscriptionFailed {
                    queue,
                    reason: "queue already has a consumer".to_string(),
                });
            };
            let stream = async_stream::stream! {
                while let Some(payload) = receiver.recv().await {
                    yield Ok(payload);
                }
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}
