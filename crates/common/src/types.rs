use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery mediums a notification can be sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Realtime,
}

/// Channel names accepted on submission, matching `ChannelKind::Display` output.
pub const VALID_CHANNELS: &[&str] = &["email", "sms", "realtime"];

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Sms => write!(f, "sms"),
            ChannelKind::Realtime => write!(f, "realtime"),
        }
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            "realtime" => Ok(ChannelKind::Realtime),
            _ => Err(()),
        }
    }
}

/// Notification delivery status.
///
/// `Pending` is the only non-terminal state. Transitions are one-way:
/// pending → sent or pending → failed, enforced by conditional updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A persisted notification and its delivery status.
///
/// The message body is an opaque blob from the pipeline's point of view; only
/// the channel gateway and the receiving client interpret it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub message: String,
    pub channel: ChannelKind,
    pub status: DeliveryStatus,
    /// Reason recorded on a permanent delivery failure.
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the record transitions to `Sent`.
    pub sent_at: Option<DateTime<Utc>>,
}

/// Queue payload instructing a worker to deliver one record.
///
/// Ephemeral: lives only on the task stream, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub record_id: Uuid,
    pub recipient: String,
    pub message: String,
    pub channel: ChannelKind,
}

/// Fire-and-forget pub/sub payload announcing a completed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub recipient: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_channel_parse_roundtrip() {
        for name in VALID_CHANNELS {
            let kind = ChannelKind::from_str(name).unwrap();
            assert_eq!(kind.to_string(), *name);
        }
    }

    #[test]
    fn test_channel_parse_rejects_unknown() {
        assert!(ChannelKind::from_str("pigeon").is_err());
        assert!(ChannelKind::from_str("EMAIL").is_err());
        assert!(ChannelKind::from_str("").is_err());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(DeliveryStatus::Sent.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
    }
}
