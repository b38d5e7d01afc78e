//! Delivery worker — consumes the task stream and settles record status.
//!
//! Each worker instance runs one long-lived loop; horizontal scaling means
//! running more instances against the shared consumer group. Tasks arrive
//! at-least-once, so every status transition goes through the store's
//! conditional updates and acking happens only after the record is settled.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{DeliveryTask, RealtimeEvent};
use herald_engine::records::{NotificationStore, TransitionOutcome};
use herald_queue::{LeasedTask, RealtimeBus, TaskQueue};

use crate::gateway::{DeliveryError, GatewayClient};

/// Reason recorded on records whose task the queue dead-lettered.
const DEAD_LETTER_REASON: &str = "delivery attempts exhausted";

/// Pause after a queue read error before the loop tries again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What the consumption loop should do with a processed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDisposition {
    /// The record is settled (or gone); acknowledge the entry.
    Ack,
    /// Transient failure; leave the entry unacked so the queue redelivers.
    Retry,
}

/// Apply a delivery attempt's outcome to the record.
///
/// Safe to re-run for the same task: a record that already settled reports
/// `AlreadyTerminal` from the store and the entry is simply acked again.
/// A record missing from the store also acks — there is nothing left to
/// transition and redelivering cannot change that.
pub async fn apply_delivery_outcome(
    pool: &PgPool,
    task: &DeliveryTask,
    outcome: Result<(), DeliveryError>,
) -> Result<TaskDisposition, AppError> {
    match outcome {
        Ok(()) => match NotificationStore::mark_sent(pool, task.record_id).await {
            Ok(TransitionOutcome::Applied) => {
                tracing::info!(
                    record_id = %task.record_id,
                    channel = %task.channel,
                    "Delivery recorded"
                );
                Ok(TaskDisposition::Ack)
            }
            Ok(TransitionOutcome::AlreadyTerminal(status)) => {
                tracing::debug!(
                    record_id = %task.record_id,
                    status = %status,
                    "Redelivered task for settled record, acking"
                );
                Ok(TaskDisposition::Ack)
            }
            Err(AppError::NotFound(_)) => {
                tracing::warn!(record_id = %task.record_id, "Record missing, acking task");
                Ok(TaskDisposition::Ack)
            }
            Err(e) => Err(e),
        },
        Err(DeliveryError::Permanent(reason)) => {
            match NotificationStore::mark_failed(pool, task.record_id, &reason).await {
                Ok(TransitionOutcome::Applied) => {
                    tracing::warn!(
                        record_id = %task.record_id,
                        reason = %reason,
                        "Delivery failed permanently"
                    );
                    Ok(TaskDisposition::Ack)
                }
                Ok(TransitionOutcome::AlreadyTerminal(status)) => {
                    tracing::debug!(
                        record_id = %task.record_id,
                        status = %status,
                        "Redelivered task for settled record, acking"
                    );
                    Ok(TaskDisposition::Ack)
                }
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(record_id = %task.record_id, "Record missing, acking task");
                    Ok(TaskDisposition::Ack)
                }
                Err(e) => Err(e),
            }
        }
        Err(DeliveryError::Retryable(reason)) => {
            tracing::warn!(
                record_id = %task.record_id,
                reason = %reason,
                "Transient delivery failure, leaving task for redelivery"
            );
            Ok(TaskDisposition::Retry)
        }
    }
}

/// One delivery worker instance.
pub struct DeliveryWorker {
    pool: PgPool,
    queue: TaskQueue,
    bus: RealtimeBus,
    gateway: GatewayClient,
    consumer: String,
}

impl DeliveryWorker {
    pub fn new(pool: PgPool, queue: TaskQueue, bus: RealtimeBus, gateway: GatewayClient) -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
        let consumer = format!("{}-{}", host, &Uuid::new_v4().simple().to_string()[..8]);

        Self {
            pool,
            queue,
            bus,
            gateway,
            consumer,
        }
    }

    /// Run the consumption loop. Runs indefinitely until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.queue.ensure_group().await?;

        tracing::info!(consumer = %self.consumer, "Delivery worker started");

        loop {
            // Pick up tasks abandoned by crashed consumers before blocking
            // on fresh work.
            match self.queue.claim_stale(&self.consumer).await {
                Ok(batch) => {
                    for task in &batch.dead_lettered {
                        if let Err(e) =
                            NotificationStore::mark_failed(&self.pool, task.record_id, DEAD_LETTER_REASON)
                                .await
                        {
                            tracing::error!(
                                record_id = %task.record_id,
                                error = %e,
                                "Failed to settle dead-lettered record"
                            );
                        }
                    }
                    for leased in batch.reclaimed {
                        self.process(leased).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stale-task reclaim failed");
                }
            }

            match self.queue.dequeue(&self.consumer).await {
                Ok(Some(leased)) => self.process(leased).await,
                Ok(None) => {} // block timeout, loop around
                Err(e) => {
                    tracing::warn!(error = %e, "Queue read failed, backing off");
                    tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Deliver one leased task and settle its record.
    ///
    /// Order matters: record update, then ack, then event publish. A crash
    /// between update and ack causes a redelivery that the conditional
    /// transition absorbs.
    async fn process(&self, leased: LeasedTask) {
        let task = &leased.task;

        let outcome = self.gateway.deliver(task).await;
        let delivered = outcome.is_ok();

        match apply_delivery_outcome(&self.pool, task, outcome).await {
            Ok(TaskDisposition::Ack) => {
                if let Err(e) = self.queue.ack(&leased.entry_id).await {
                    tracing::warn!(
                        entry_id = %leased.entry_id,
                        error = %e,
                        "Ack failed, task will be redelivered"
                    );
                    return;
                }

                if delivered {
                    // Completions are announced for every channel, not just
                    // realtime; connected listeners observe email and sms
                    // deliveries too.
                    let event = RealtimeEvent {
                        recipient: task.recipient.clone(),
                        message: task.message.clone(),
                    };
                    if let Err(e) = self.bus.publish(&event).await {
                        tracing::warn!(
                            record_id = %task.record_id,
                            error = %e,
                            "Event publish failed, realtime listeners miss this delivery"
                        );
                    }
                }
            }
            Ok(TaskDisposition::Retry) => {
                // Unacked on purpose: the queue redelivers after the idle
                // timeout.
            }
            Err(e) => {
                tracing::error!(
                    record_id = %task.record_id,
                    error = %e,
                    "Failed to settle record, leaving task unacked"
                );
            }
        }
    }
}
