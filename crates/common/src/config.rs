use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (task queue + realtime bus)
    pub redis_url: String,

    /// Port the HTTP ingestion API listens on (default: 3000)
    pub api_port: u16,

    /// Port the WebSocket relay listens on (default: 8080)
    pub relay_port: u16,

    /// How long a worker blocks waiting for the next task, in milliseconds
    /// (default: 5000)
    pub task_block_ms: u64,

    /// Idle time after which an unacknowledged task is reclaimed from a dead
    /// consumer, in milliseconds (default: 30000)
    pub task_min_idle_ms: u64,

    /// Deliveries after which a task is dead-lettered instead of retried
    /// (default: 5)
    pub task_max_deliveries: u64,

    /// HTTP endpoint the email gateway is reachable at; deliveries are
    /// simulated when unset
    pub email_gateway_url: Option<String>,

    /// HTTP endpoint the SMS gateway is reachable at; deliveries are
    /// simulated when unset
    pub sms_gateway_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            relay_port: std::env::var("RELAY_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RELAY_PORT must be a valid u16"))?,
            task_block_ms: std::env::var("TASK_BLOCK_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TASK_BLOCK_MS must be a valid u64"))?,
            task_min_idle_ms: std::env::var("TASK_MIN_IDLE_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TASK_MIN_IDLE_MS must be a valid u64"))?,
            task_max_deliveries: std::env::var("TASK_MAX_DELIVERIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TASK_MAX_DELIVERIES must be a valid u64"))?,
            email_gateway_url: std::env::var("EMAIL_GATEWAY_URL").ok(),
            sms_gateway_url: std::env::var("SMS_GATEWAY_URL").ok(),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
