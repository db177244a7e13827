//! Configuration management

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub identity: IdentityConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Calendar sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between pull cycles (external busy blocks + orphan scan)
    pub pull_interval_seconds: u64,
    /// Push worker poll interval for pending outbox jobs
    pub push_poll_interval_seconds: u64,
    /// How far ahead busy blocks are fetched, in days
    pub lookahead_days: u32,
    /// Timeout applied to every external calendar call
    pub request_timeout_seconds: u64,
    /// Maximum push jobs drained per poll
    pub push_batch_size: usize,
    /// Cron expression for the appointment completion sweep
    pub completion_sweep_cron: String,
    pub enabled: bool,
}

/// Identity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Token introspection endpoint of the identity service
    pub introspect_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { path: "bookline.db".to_string(), pool_size: 8 },
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 8080 },
            sync: SyncConfig {
                pull_interval_seconds: 300,
                push_poll_interval_seconds: 10,
                lookahead_days: 30,
                request_timeout_seconds: 30,
                push_batch_size: 25,
                completion_sweep_cron: "0 */5 * * * *".to_string(),
                enabled: true,
            },
            identity: IdentityConfig {
                introspect_url: "http://127.0.0.1:9100/introspect".to_string(),
            },
        }
    }
}
