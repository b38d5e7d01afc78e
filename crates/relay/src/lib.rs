pub mod registry;
pub mod ws;

use std::sync::Arc;

use herald_queue::EventSubscriber;

use crate::registry::{ConnectionRegistry, ForwardOutcome};

/// Forward bus events to live connections until the subscription ends.
///
/// Best-effort only: an event for a recipient with no connection is dropped
/// without error, and a dead connection only costs that one event.
pub async fn run_subscriber(registry: Arc<ConnectionRegistry>, mut subscriber: EventSubscriber) {
    while let Some(event) = subscriber.next_event().await {
        match registry.forward(&event.recipient, &event.message) {
            ForwardOutcome::Delivered => {
                tracing::debug!(recipient = %event.recipient, "Event forwarded");
            }
            ForwardOutcome::NoConnection => {
                tracing::debug!(recipient = %event.recipient, "No live connection, event dropped");
            }
            ForwardOutcome::ConnectionClosed => {
                tracing::info!(
                    recipient = %event.recipient,
                    "Connection closed mid-send, stale entry evicted"
                );
            }
        }
    }

    tracing::warn!("Realtime bus subscription ended");
}
