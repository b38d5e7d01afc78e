//! Durable task queue over a Redis Stream consumer group.
//!
//! Delivery contract:
//! 1. `enqueue` appends the JSON-encoded task to the stream
//! 2. `dequeue` hands each entry to exactly one consumer in the group
//! 3. the consumer `ack`s after the record is settled; unacked entries stay
//!    in the pending list and are reclaimed by `claim_stale` once idle
//! 4. entries redelivered past the configured cap are moved to the DLQ
//!
//! At-least-once: a crash between processing and ack means redelivery, so
//! task handling must tolerate duplicates.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};

use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::DeliveryTask;

/// Stream carrying delivery tasks from the API to the workers.
const TASK_STREAM: &str = "notifications:tasks";

/// Consumer group shared by all delivery worker instances.
const TASK_GROUP: &str = "delivery_workers";

/// Dead letter stream for tasks that exhausted their delivery attempts.
const DLQ_STREAM: &str = "notifications:dlq";

/// Upper bound on pending entries inspected per reclaim pass.
const CLAIM_BATCH: usize = 100;

/// A task leased to one consumer, pending acknowledgment.
#[derive(Debug, Clone)]
pub struct LeasedTask {
    /// Stream entry id, required for the eventual `ack`.
    pub entry_id: String,
    pub task: DeliveryTask,
}

/// Result of a stale-entry reclaim pass.
#[derive(Debug, Default)]
pub struct ClaimedBatch {
    /// Tasks taken over from dead consumers, ready for reprocessing.
    pub reclaimed: Vec<LeasedTask>,
    /// Tasks moved to the DLQ after exhausting their delivery attempts.
    pub dead_lettered: Vec<DeliveryTask>,
}

/// Producer/consumer handle for the delivery task stream.
#[derive(Clone)]
pub struct TaskQueue {
    redis: ConnectionManager,
    stream: String,
    group: String,
    dlq: String,
    block_ms: u64,
    min_idle_ms: u64,
    max_deliveries: u64,
}

impl TaskQueue {
    pub fn new(redis: ConnectionManager, config: &AppConfig) -> Self {
        Self {
            redis,
            stream: TASK_STREAM.to_string(),
            group: TASK_GROUP.to_string(),
            dlq: DLQ_STREAM.to_string(),
            block_ms: config.task_block_ms,
            min_idle_ms: config.task_min_idle_ms,
            max_deliveries: config.task_max_deliveries,
        }
    }

    /// Override the stream/group/DLQ names. Used by tests to isolate runs.
    pub fn with_stream_names(mut self, stream: &str, group: &str, dlq: &str) -> Self {
        self.stream = stream.to_string();
        self.group = group.to_string();
        self.dlq = dlq.to_string();
        self
    }

    /// Create the consumer group, tolerating one that already exists.
    pub async fn ensure_group(&self) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let result: Result<String, redis::RedisError> = redis
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;

        match result {
            Ok(_) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a delivery task to the stream. Returns the stream entry id.
    pub async fn enqueue(&self, task: &DeliveryTask) -> Result<String, AppError> {
        let payload = serde_json::to_string(task)
            .map_err(|e| AppError::Internal(format!("Task encode failed: {}", e)))?;

        let mut redis = self.redis.clone();
        let entry_id: String = redis
            .xadd(&self.stream, "*", &[("payload", payload.as_str())])
            .await?;

        tracing::debug!(
            record_id = %task.record_id,
            entry_id = %entry_id,
            "Task enqueued"
        );

        Ok(entry_id)
    }

    /// Block up to `task_block_ms` for the next task leased to `consumer`.
    ///
    /// Returns `None` when the block timeout elapses with nothing to do.
    /// Entries whose payload cannot be decoded are acked and dropped so a
    /// poison entry cannot wedge the group.
    pub async fn dequeue(&self, consumer: &str) -> Result<Option<LeasedTask>, AppError> {
        let opts = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(1)
            .block(self.block_ms as usize);

        let mut redis = self.redis.clone();
        let reply: StreamReadReply = redis
            .xread_options(&[self.stream.as_str()], &[">"], &opts)
            .await?;

        for key in reply.keys {
            for entry in key.ids {
                match Self::decode_entry(&entry) {
                    Some(task) => {
                        return Ok(Some(LeasedTask {
                            entry_id: entry.id,
                            task,
                        }));
                    }
                    None => {
                        tracing::warn!(entry_id = %entry.id, "Undecodable task payload, dropping");
                        self.ack(&entry.id).await?;
                    }
                }
            }
        }

        Ok(None)
    }

    /// Acknowledge a processed entry, removing it from the pending list.
    pub async fn ack(&self, entry_id: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _acked: i64 = redis.xack(&self.stream, &self.group, &[entry_id]).await?;
        Ok(())
    }

    /// Take over entries whose consumer went quiet.
    ///
    /// Entries idle past `task_min_idle_ms` are claimed for `consumer` and
    /// returned for reprocessing. Entries already delivered more than
    /// `task_max_deliveries` times are copied to the DLQ and acked instead;
    /// their decoded tasks are returned separately so the caller can settle
    /// the affected records.
    pub async fn claim_stale(&self, consumer: &str) -> Result<ClaimedBatch, AppError> {
        let mut redis = self.redis.clone();
        let pending: StreamPendingCountReply = redis
            .xpending_count(&self.stream, &self.group, "-", "+", CLAIM_BATCH)
            .await?;

        let mut stale_ids = Vec::new();
        let mut exhausted_ids = Vec::new();
        for entry in &pending.ids {
            if (entry.last_delivered_ms as u64) < self.min_idle_ms {
                continue;
            }
            if entry.times_delivered as u64 > self.max_deliveries {
                exhausted_ids.push(entry.id.clone());
            } else {
                stale_ids.push(entry.id.clone());
            }
        }

        let mut batch = ClaimedBatch::default();

        if !stale_ids.is_empty() {
            let claimed: StreamClaimReply = redis
                .xclaim(
                    &self.stream,
                    &self.group,
                    consumer,
                    self.min_idle_ms as usize,
                    &stale_ids,
                )
                .await?;

            for entry in claimed.ids {
                match Self::decode_entry(&entry) {
                    Some(task) => {
                        tracing::info!(
                            entry_id = %entry.id,
                            record_id = %task.record_id,
                            "Reclaimed stale task"
                        );
                        batch.reclaimed.push(LeasedTask {
                            entry_id: entry.id,
                            task,
                        });
                    }
                    None => {
                        tracing::warn!(entry_id = %entry.id, "Undecodable reclaimed payload, dropping");
                        self.ack(&entry.id).await?;
                    }
                }
            }
        }

        if !exhausted_ids.is_empty() {
            // Claiming transfers ownership so the XACK below is honored.
            let claimed: StreamClaimReply = redis
                .xclaim(
                    &self.stream,
                    &self.group,
                    consumer,
                    self.min_idle_ms as usize,
                    &exhausted_ids,
                )
                .await?;

            for entry in claimed.ids {
                let task = Self::decode_entry(&entry);
                if let Some(payload) = entry.get::<String>("payload") {
                    let _dlq_id: String = redis
                        .xadd(&self.dlq, "*", &[("payload", payload.as_str())])
                        .await?;
                }
                self.ack(&entry.id).await?;

                if let Some(task) = task {
                    tracing::warn!(
                        entry_id = %entry.id,
                        record_id = %task.record_id,
                        max_deliveries = self.max_deliveries,
                        "Task dead-lettered"
                    );
                    batch.dead_lettered.push(task);
                }
            }
        }

        Ok(batch)
    }

    fn decode_entry(entry: &StreamId) -> Option<DeliveryTask> {
        let payload: String = entry.get("payload")?;
        serde_json::from_str(&payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    use herald_common::types::ChannelKind;

    fn make_entry(payload: Option<&str>) -> StreamId {
        let mut map = HashMap::new();
        if let Some(p) = payload {
            map.insert(
                "payload".to_string(),
                redis::Value::BulkString(p.as_bytes().to_vec()),
            );
        }
        StreamId {
            id: "1-0".to_string(),
            map,
        }
    }

    #[test]
    fn test_decode_entry_valid() {
        let task = DeliveryTask {
            record_id: Uuid::new_v4(),
            recipient: "u1".to_string(),
            message: "hi".to_string(),
            channel: ChannelKind::Email,
        };
        let entry = make_entry(Some(&serde_json::to_string(&task).unwrap()));

        let decoded = TaskQueue::decode_entry(&entry).unwrap();
        assert_eq!(decoded.record_id, task.record_id);
        assert_eq!(decoded.recipient, "u1");
        assert_eq!(decoded.channel, ChannelKind::Email);
    }

    #[test]
    fn test_decode_entry_missing_payload() {
        assert!(TaskQueue::decode_entry(&make_entry(None)).is_none());
    }

    #[test]
    fn test_decode_entry_garbage_payload() {
        assert!(TaskQueue::decode_entry(&make_entry(Some("not json"))).is_none());
    }
}
