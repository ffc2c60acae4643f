// src/config.rs

use std::env;
use std::time::Duration;
use dotenvy::dotenv;

/// `max_attempts` value meaning a learner may retry without limit.
pub const UNLIMITED_ATTEMPTS: i32 = -1;

/// Order index stored on sections that were archived by a re-edit.
pub const ARCHIVED_ORDER_INDEX: i32 = -1;

/// Total runs of a transactional operation before a serialization conflict
/// is reported to the client.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// Fixed pause between two runs of a conflicting transaction.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub server_port: u16,
    /// Seconds accepted after an attempt's deadline before submit is refused.
    pub submit_grace_seconds: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let submit_grace_seconds = env::var("SUBMIT_GRACE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            server_port,
            submit_grace_seconds,
        }
    }
}
