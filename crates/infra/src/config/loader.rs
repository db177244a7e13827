//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required variables are absent, falls back to a config file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required for the environment path:
//! - `BOOKLINE_DB_PATH`: SQLite database file path
//! - `BOOKLINE_IDENTITY_INTROSPECT_URL`: token introspection endpoint
//!
//! Optional overrides (defaults apply when unset):
//! - `BOOKLINE_DB_POOL_SIZE`: connection pool size
//! - `BOOKLINE_HOST` / `BOOKLINE_PORT`: HTTP bind address
//! - `BOOKLINE_PULL_INTERVAL`: busy-block pull interval in seconds
//! - `BOOKLINE_PUSH_POLL_INTERVAL`: outbox poll interval in seconds
//! - `BOOKLINE_SYNC_LOOKAHEAD_DAYS`: busy-block fetch horizon
//! - `BOOKLINE_REQUEST_TIMEOUT`: external call timeout in seconds
//! - `BOOKLINE_PUSH_BATCH_SIZE`: outbox jobs drained per poll
//! - `BOOKLINE_COMPLETION_SWEEP_CRON`: completion sweep schedule
//! - `BOOKLINE_SYNC_ENABLED`: whether background sync runs (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml`
//! 2. `./bookline.json` or `./bookline.toml`
//! 3. Parent and grandparent directory variants of the above
//! 4. Relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bookline_domain::{
    BooklineError, Config, DatabaseConfig, IdentityConfig, Result, ServerConfig, SyncConfig,
};

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `BooklineError::Config` if neither the environment nor any
/// probed file yields a valid configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The database path and introspection URL must be present; every other
/// variable falls back to its [`Config::default`] value.
///
/// # Errors
/// Returns `BooklineError::Config` if a required variable is missing or
/// any set variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let defaults = Config::default();

    let db_path = env_var("BOOKLINE_DB_PATH")?;
    let introspect_url = env_var("BOOKLINE_IDENTITY_INTROSPECT_URL")?;

    let pool_size = env_parse("BOOKLINE_DB_POOL_SIZE", defaults.database.pool_size)?;
    let host = std::env::var("BOOKLINE_HOST").unwrap_or(defaults.server.host);
    let port = env_parse("BOOKLINE_PORT", defaults.server.port)?;

    let sync = SyncConfig {
        pull_interval_seconds: env_parse(
            "BOOKLINE_PULL_INTERVAL",
            defaults.sync.pull_interval_seconds,
        )?,
        push_poll_interval_seconds: env_parse(
            "BOOKLINE_PUSH_POLL_INTERVAL",
            defaults.sync.push_poll_interval_seconds,
        )?,
        lookahead_days: env_parse("BOOKLINE_SYNC_LOOKAHEAD_DAYS", defaults.sync.lookahead_days)?,
        request_timeout_seconds: env_parse(
            "BOOKLINE_REQUEST_TIMEOUT",
            defaults.sync.request_timeout_seconds,
        )?,
        push_batch_size: env_parse("BOOKLINE_PUSH_BATCH_SIZE", defaults.sync.push_batch_size)?,
        completion_sweep_cron: std::env::var("BOOKLINE_COMPLETION_SWEEP_CRON")
            .unwrap_or(defaults.sync.completion_sweep_cron),
        enabled: env_bool("BOOKLINE_SYNC_ENABLED", defaults.sync.enabled),
    };

    Ok(Config {
        database: DatabaseConfig { path: db_path, pool_size },
        server: ServerConfig { host, port },
        sync,
        identity: IdentityConfig { introspect_url },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is
/// detected by extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `BooklineError::Config` if the file is missing, unreadable,
/// or fails to parse.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BooklineError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BooklineError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| BooklineError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| BooklineError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| BooklineError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(BooklineError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("bookline.json"),
            cwd.join("bookline.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("bookline.json"),
                exe_dir.join("bookline.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        BooklineError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse a typed value from an environment variable, falling back to
/// `default` when the variable is not set.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| BooklineError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`
/// (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
