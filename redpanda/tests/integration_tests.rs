//! Integration tests for [`RedpandaCommandQueue`] against a real broker.
//!
//! These tests are marked `#[ignore]` because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to start Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p banking-ledger-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use banking_ledger_core::queue::CommandQueue;
use banking_ledger_redpanda::RedpandaCommandQueue;
use futures::StreamExt;
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

const WARMUP: &[u8] = b"warmup";

/// Publish until the broker accepts, which also auto-creates the topic.
async fn wait_for_topic(queue: &RedpandaCommandQueue, topic: &str) {
    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if queue.publish(topic, WARMUP).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            attempt != max_attempts,
            "Topic {topic} not ready after {max_attempts} attempts"
        );
    }
}

async fn start_queue(group: &str) -> (testcontainers::ContainerAsync<Kafka>, RedpandaCommandQueue) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");

    let queue = RedpandaCommandQueue::builder()
        .brokers(format!("{host}:{port}"))
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create command queue");

    (kafka, queue)
}

/// Collect `count` non-warmup payloads or fail after a timeout.
async fn receive(
    deliveries: &mut banking_ledger_core::queue::DeliveryStream,
    count: usize,
) -> Vec<Vec<u8>> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(20), async {
        while received.len() < count {
            match deliveries.next().await {
                Some(Ok(payload)) if payload != WARMUP => received.push(payload),
                Some(Ok(_)) => {},
                Some(Err(e)) => panic!("delivery failed: {e}"),
                None => panic!("delivery stream ended"),
            }
        }
    })
    .await
    .expect("Timeout waiting for deliveries");
    received
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_payloads_round_trip_in_order() {
    let (_kafka, queue) = start_queue("ledger-round-trip").await;
    wait_for_topic(&queue, "transaction_processor").await;

    let mut deliveries = queue
        .consume("transaction_processor")
        .await
        .expect("Failed to consume");

    let first = br#"{"accountNumber":"A1","amount":50,"type":"DEPOSIT","transactionId":"t-1"}"#;
    let second = br#"{"accountNumber":"A1","amount":30,"type":"WITHDRAWAL","transactionId":"t-2"}"#;
    queue.publish("transaction_processor", first).await.expect("publish t-1");
    queue.publish("transaction_processor", second).await.expect("publish t-2");

    let received = receive(&mut deliveries, 2).await;
    assert_eq!(received[0], first.to_vec());
    assert_eq!(received[1], second.to_vec());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_queues_are_separate_topics() {
    let (_kafka, queue) = start_queue("ledger-separate").await;
    wait_for_topic(&queue, "account_creator").await;
    wait_for_topic(&queue, "transaction_processor").await;

    let mut accounts = queue.consume("account_creator").await.expect("consume accounts");

    queue
        .publish("transaction_processor", b"transaction")
        .await
        .expect("publish transaction");
    queue
        .publish("account_creator", b"account")
        .await
        .expect("publish account");

    let received = receive(&mut accounts, 1).await;
    assert_eq!(received, vec![b"account".to_vec()]);
}
