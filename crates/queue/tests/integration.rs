//! Integration tests for the task queue.
//!
//! Requires a running Redis instance. Run with:
//!
//! ```bash
//! REDIS_URL="redis://localhost:6379" \
//!   cargo test -p herald-queue --test integration -- --ignored --nocapture
//! ```

use uuid::Uuid;

use herald_common::config::AppConfig;
use herald_common::types::{ChannelKind, DeliveryTask};
use herald_queue::TaskQueue;

fn test_config(min_idle_ms: u64, max_deliveries: u64) -> AppConfig {
    AppConfig {
        database_url: "unused".to_string(),
        redis_url: std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        api_port: 3000,
        relay_port: 8080,
        task_block_ms: 200,
        task_min_idle_ms: min_idle_ms,
        task_max_deliveries: max_deliveries,
        email_gateway_url: None,
        sms_gateway_url: None,
        db_max_connections: 5,
    }
}

/// Build a queue on uniquely named streams so tests cannot interfere.
async fn build_queue(config: &AppConfig) -> TaskQueue {
    let redis = herald_common::redis_pool::create_redis_pool(&config.redis_url)
        .await
        .unwrap();

    let suffix = Uuid::new_v4().simple().to_string();
    let queue = TaskQueue::new(redis, config).with_stream_names(
        &format!("test:tasks:{}", suffix),
        &format!("test_workers_{}", suffix),
        &format!("test:dlq:{}", suffix),
    );
    queue.ensure_group().await.unwrap();
    queue
}

fn make_task(recipient: &str) -> DeliveryTask {
    DeliveryTask {
        record_id: Uuid::new_v4(),
        recipient: recipient.to_string(),
        message: "hello".to_string(),
        channel: ChannelKind::Email,
    }
}

#[tokio::test]
#[ignore]
async fn test_enqueue_dequeue_ack_roundtrip() {
    let config = test_config(30_000, 5);
    let queue = build_queue(&config).await;

    let task = make_task("u1");
    queue.enqueue(&task).await.unwrap();

    let leased = queue.dequeue("consumer-a").await.unwrap().unwrap();
    assert_eq!(leased.task.record_id, task.record_id);
    assert_eq!(leased.task.recipient, "u1");
    assert_eq!(leased.task.channel, ChannelKind::Email);

    queue.ack(&leased.entry_id).await.unwrap();

    // Stream drained: the next blocking read times out empty.
    assert!(queue.dequeue("consumer-a").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_ensure_group_is_idempotent() {
    let config = test_config(30_000, 5);
    let queue = build_queue(&config).await;

    // A second create must tolerate BUSYGROUP.
    queue.ensure_group().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_unacked_task_is_reclaimed() {
    // min_idle 0: anything unacked is immediately stale.
    let config = test_config(0, 5);
    let queue = build_queue(&config).await;

    let task = make_task("u2");
    queue.enqueue(&task).await.unwrap();

    // consumer-a leases the task and dies before acking.
    let leased = queue.dequeue("consumer-a").await.unwrap().unwrap();

    let batch = queue.claim_stale("consumer-b").await.unwrap();
    assert_eq!(batch.reclaimed.len(), 1);
    assert!(batch.dead_lettered.is_empty());
    assert_eq!(batch.reclaimed[0].task.record_id, task.record_id);
    assert_eq!(batch.reclaimed[0].entry_id, leased.entry_id);

    // Acking the reclaimed entry settles it for good.
    queue.ack(&batch.reclaimed[0].entry_id).await.unwrap();
    let batch = queue.claim_stale("consumer-b").await.unwrap();
    assert!(batch.reclaimed.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_exhausted_task_is_dead_lettered() {
    let config = test_config(0, 1);
    let queue = build_queue(&config).await;

    let task = make_task("u3");
    queue.enqueue(&task).await.unwrap();

    // Delivery #1 via the group read, never acked.
    queue.dequeue("consumer-a").await.unwrap().unwrap();

    // Delivery #2 via reclaim: still within the cap.
    let batch = queue.claim_stale("consumer-b").await.unwrap();
    assert_eq!(batch.reclaimed.len(), 1);
    assert!(batch.dead_lettered.is_empty());

    // Next pass: the delivery count now exceeds the cap of 1.
    let batch = queue.claim_stale("consumer-b").await.unwrap();
    assert!(batch.reclaimed.is_empty());
    assert_eq!(batch.dead_lettered.len(), 1);
    assert_eq!(batch.dead_lettered[0].record_id, task.record_id);

    // Dead-lettered entries are acked: nothing left to claim.
    let batch = queue.claim_stale("consumer-b").await.unwrap();
    assert!(batch.reclaimed.is_empty());
    assert!(batch.dead_lettered.is_empty());
}
