//! Ingestion service — accepts a notification request, persists its intent,
//! and hands a delivery task to the workers.
//!
//! Ordering guarantee: the pending record is committed before the task is
//! enqueued, so a worker can never observe a task whose record is missing.

use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{ChannelKind, DeliveryTask, Notification, VALID_CHANNELS};
use herald_queue::TaskQueue;

use crate::records::NotificationStore;

/// Parameters for submitting a notification.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SubmitParams {
    pub recipient: String,
    pub message: String,
    pub channel: String,
}

impl SubmitParams {
    /// Validate the request, resolving the channel name.
    pub fn validate(&self) -> Result<ChannelKind, AppError> {
        if self.recipient.trim().is_empty() {
            return Err(AppError::Validation(
                "recipient must not be empty".to_string(),
            ));
        }

        if self.message.is_empty() {
            return Err(AppError::Validation("message must not be empty".to_string()));
        }

        self.channel.parse().map_err(|_| {
            AppError::Validation(format!(
                "Invalid channel '{}'. Valid channels: {}",
                self.channel,
                VALID_CHANNELS.join(", ")
            ))
        })
    }
}

/// Service layer for the ingestion boundary.
pub struct IngestionService;

impl IngestionService {
    /// Accept a notification: one record insert, one task enqueue.
    ///
    /// The caller gets the pending record back immediately; delivery happens
    /// asynchronously. If the enqueue fails the record stays pending with no
    /// task referencing it — there is no reconciliation pass for such
    /// orphans, the caller sees the queue error and may resubmit.
    pub async fn submit(
        pool: &PgPool,
        queue: &TaskQueue,
        params: &SubmitParams,
    ) -> Result<Notification, AppError> {
        let channel = params.validate()?;

        let record =
            NotificationStore::create(pool, &params.recipient, &params.message, channel).await?;

        let task = DeliveryTask {
            record_id: record.id,
            recipient: record.recipient.clone(),
            message: record.message.clone(),
            channel,
        };
        queue.enqueue(&task).await?;

        tracing::info!(record_id = %record.id, "Notification accepted");

        Ok(record)
    }

    /// Read-only snapshot of a record's current state.
    pub async fn status(pool: &PgPool, id: Uuid) -> Result<Notification, AppError> {
        NotificationStore::get(pool, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(recipient: &str, message: &str, channel: &str) -> SubmitParams {
        SubmitParams {
            recipient: recipient.to_string(),
            message: message.to_string(),
            channel: channel.to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_known_channels() {
        assert_eq!(
            params("u1", "hi", "email").validate().unwrap(),
            ChannelKind::Email
        );
        assert_eq!(
            params("u1", "hi", "sms").validate().unwrap(),
            ChannelKind::Sms
        );
        assert_eq!(
            params("u1", "hi", "realtime").validate().unwrap(),
            ChannelKind::Realtime
        );
    }

    #[test]
    fn test_validate_rejects_unknown_channel() {
        let err = params("u1", "hi", "bogus").validate().unwrap_err();
        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("bogus"));
                assert!(msg.contains("realtime"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(matches!(
            params("", "hi", "email").validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            params("  ", "hi", "email").validate(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            params("u1", "", "email").validate(),
            Err(AppError::Validation(_))
        ));
    }
}
