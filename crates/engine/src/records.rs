//! Record store — persistence for notification records.
//!
//! The store is the single source of truth for delivery status. Terminal
//! transitions are conditional on the current status: redelivered tasks and
//! concurrent workers can re-apply a transition without corrupting a record
//! that already settled.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{ChannelKind, DeliveryStatus, Notification};

/// Outcome of a conditional status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record moved from pending to the requested terminal status.
    Applied,
    /// The record had already settled; nothing was changed.
    AlreadyTerminal(DeliveryStatus),
}

/// Service layer for notification record persistence.
pub struct NotificationStore;

impl NotificationStore {
    /// Insert a fresh pending record and return it.
    pub async fn create(
        pool: &PgPool,
        recipient: &str,
        message: &str,
        channel: ChannelKind,
    ) -> Result<Notification, AppError> {
        let id = Uuid::new_v4();

        let record: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (id, recipient, message, channel, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(recipient)
        .bind(message)
        .bind(channel.to_string())
        .bind(DeliveryStatus::Pending.to_string())
        .fetch_one(pool)
        .await?;

        tracing::info!(
            record_id = %record.id,
            channel = %record.channel,
            "Notification record created"
        );

        Ok(record)
    }

    /// Fetch a record by id.
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Notification, AppError> {
        let record: Notification = sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        Ok(record)
    }

    /// Transition a pending record to `sent`, stamping `sent_at`.
    ///
    /// A record that already settled is left untouched and reported as
    /// `AlreadyTerminal`; `sent_at` is never reset.
    pub async fn mark_sent(pool: &PgPool, id: Uuid) -> Result<TransitionOutcome, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, sent_at = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(DeliveryStatus::Sent.to_string())
        .bind(Utc::now())
        .bind(id)
        .bind(DeliveryStatus::Pending.to_string())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(TransitionOutcome::Applied);
        }

        // Nothing updated: either the record settled earlier or the id is
        // unknown. The follow-up read distinguishes the two.
        let current = Self::get(pool, id).await?;
        Ok(TransitionOutcome::AlreadyTerminal(current.status))
    }

    /// Transition a pending record to `failed`, recording the reason.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        reason: &str,
    ) -> Result<TransitionOutcome, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, error_detail = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(DeliveryStatus::Failed.to_string())
        .bind(reason)
        .bind(id)
        .bind(DeliveryStatus::Pending.to_string())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(TransitionOutcome::Applied);
        }

        let current = Self::get(pool, id).await?;
        Ok(TransitionOutcome::AlreadyTerminal(current.status))
    }
}
