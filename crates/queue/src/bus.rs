//! Realtime bus — best-effort pub/sub broadcast of delivery events.
//!
//! Events are fire-and-forget: no persistence, no replay, and a publish with
//! zero subscribers succeeds. Guarantees stay with the task stream; the bus
//! only feeds live listeners.

use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use herald_common::error::AppError;
use herald_common::types::RealtimeEvent;

/// Pub/sub channel carrying delivery events to relay instances.
const EVENTS_CHANNEL: &str = "notifications:events";

/// Publisher handle for delivery events.
#[derive(Clone)]
pub struct RealtimeBus {
    redis: ConnectionManager,
}

impl RealtimeBus {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Broadcast an event to all current subscribers.
    pub async fn publish(&self, event: &RealtimeEvent) -> Result<(), AppError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::Internal(format!("Event encode failed: {}", e)))?;

        let mut redis = self.redis.clone();
        let receivers: i64 = redis.publish(EVENTS_CHANNEL, payload).await?;

        tracing::debug!(
            recipient = %event.recipient,
            receivers,
            "Delivery event published"
        );

        Ok(())
    }
}

/// Process-lifetime subscription to the delivery event channel.
pub struct EventSubscriber {
    pubsub: redis::aio::PubSub,
}

impl EventSubscriber {
    /// Open a dedicated pub/sub connection and subscribe to the event channel.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(EVENTS_CHANNEL).await?;

        tracing::info!(channel = EVENTS_CHANNEL, "Subscribed to realtime bus");
        Ok(Self { pubsub })
    }

    /// Wait for the next decodable event.
    ///
    /// Malformed payloads are skipped with a warning. Returns `None` once the
    /// underlying connection is gone.
    pub async fn next_event(&mut self) -> Option<RealtimeEvent> {
        loop {
            let msg = self.pubsub.on_message().next().await?;

            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable bus message, skipping");
                    continue;
                }
            };

            match serde_json::from_str::<RealtimeEvent>(&payload) {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed bus payload, skipping");
                    continue;
                }
            }
        }
    }
}
