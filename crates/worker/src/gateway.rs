//! Channel gateway client — performs the external delivery action for a task.
//!
//! Email and SMS are handed to HTTP gateways configured per channel; a
//! channel without a configured endpoint logs and reports success, which
//! keeps the pipeline exercisable without live provider credentials. The
//! `realtime` channel needs no gateway call at all: the bus publish after
//! settlement is the delivery.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::types::{ChannelKind, DeliveryTask};

/// How long a single gateway call may take before it counts as a transient
/// failure.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Classification of a failed delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Transient downstream trouble; the task stays unacked and the queue
    /// redelivers it later.
    #[error("retryable delivery failure: {0}")]
    Retryable(String),

    /// The delivery can never succeed (e.g. the recipient is invalid for the
    /// channel); the record is settled as failed.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// HTTP client for the per-channel delivery gateways.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    email_url: Option<String>,
    sms_url: Option<String>,
}

impl GatewayClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            email_url: config.email_gateway_url.clone(),
            sms_url: config.sms_gateway_url.clone(),
        }
    }

    /// Perform the delivery action for one task.
    pub async fn deliver(&self, task: &DeliveryTask) -> Result<(), DeliveryError> {
        let endpoint = match task.channel {
            // Delivered via the realtime bus after the record settles.
            ChannelKind::Realtime => return Ok(()),
            ChannelKind::Email => self.email_url.as_deref(),
            ChannelKind::Sms => self.sms_url.as_deref(),
        };

        let Some(url) = endpoint else {
            tracing::info!(
                record_id = %task.record_id,
                channel = %task.channel,
                "No gateway configured for channel, simulating delivery"
            );
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .timeout(GATEWAY_TIMEOUT)
            .json(&serde_json::json!({
                "recipient": task.recipient,
                "message": task.message,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Retryable(format!("gateway timeout: {}", e))
                } else {
                    DeliveryError::Retryable(format!("gateway unreachable: {}", e))
                }
            })?;

        classify_status(response.status())
    }
}

/// Map a gateway response status onto the retry policy.
///
/// 4xx means the request itself is unacceptable and retrying cannot help;
/// 429 and every 5xx are transient. The policy is deliberately coarse: the
/// queue's redelivery cap bounds how long a retryable task lives.
fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(DeliveryError::Retryable(format!(
            "gateway returned {}",
            status
        )));
    }

    Err(DeliveryError::Permanent(format!(
        "gateway rejected delivery with {}",
        status
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses_pass() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::ACCEPTED).is_ok());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST),
            Err(DeliveryError::Permanent(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Err(DeliveryError::Permanent(_))
        ));
    }

    #[test]
    fn test_server_errors_and_throttling_are_retryable() {
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(DeliveryError::Retryable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(DeliveryError::Retryable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(DeliveryError::Retryable(_))
        ));
    }
}
