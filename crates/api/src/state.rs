//! Shared application state for the Axum API server.

use herald_common::config::AppConfig;
use herald_queue::TaskQueue;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub queue: TaskQueue,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(pool: PgPool, queue: TaskQueue, config: AppConfig) -> Self {
        Self {
            pool,
            queue,
            config,
        }
    }
}
