//! Notification submission and status routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::Notification;
use herald_engine::ingest::{IngestionService, SubmitParams};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(submit_notification))
        .route("/api/notifications/{id}", get(notification_status))
}

/// POST /api/notifications — Accept a notification for asynchronous delivery.
///
/// Responds 202: the record is durably pending, delivery happens later.
async fn submit_notification(
    State(state): State<AppState>,
    Json(params): Json<SubmitParams>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let record = IngestionService::submit(&state.pool, &state.queue, &params).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "id": record.id,
            "status": record.status,
        })),
    ))
}

/// GET /api/notifications/:id — Snapshot of a record's delivery state.
async fn notification_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let record = IngestionService::status(&state.pool, id).await?;
    Ok(Json(record))
}
