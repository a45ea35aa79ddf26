use thiserror::Error;

use crate::app_config::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files, which is useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup, no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<bool>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let upstream_base_url = require("VELOSYNC_UPSTREAM_BASE_URL")?;
    let upstream_consumer_key = require("VELOSYNC_UPSTREAM_CONSUMER_KEY")?;
    let upstream_consumer_secret = require("VELOSYNC_UPSTREAM_CONSUMER_SECRET")?;

    let env = parse_environment(&or_default("VELOSYNC_ENV", "development"));
    let bind_addr = parse_addr("VELOSYNC_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("VELOSYNC_LOG_LEVEL", "info");

    let catalog_timeout_secs = parse_u64("VELOSYNC_CATALOG_TIMEOUT_SECS", "30")?;
    let entity_timeout_secs = parse_u64("VELOSYNC_ENTITY_TIMEOUT_SECS", "10")?;
    let max_retries = parse_u32("VELOSYNC_MAX_RETRIES", "3")?;
    let variation_max_retries = parse_u32("VELOSYNC_VARIATION_MAX_RETRIES", "1")?;
    let backoff_base_ms = parse_u64("VELOSYNC_BACKOFF_BASE_MS", "1000")?;
    let backoff_cap_ms = parse_u64("VELOSYNC_BACKOFF_CAP_MS", "10000")?;
    let auth_backoff_base_ms = parse_u64("VELOSYNC_AUTH_BACKOFF_BASE_MS", "3000")?;

    let breaker_failure_threshold = parse_u32("VELOSYNC_BREAKER_FAILURE_THRESHOLD", "3")?;
    let breaker_cooldown_secs = parse_u64("VELOSYNC_BREAKER_COOLDOWN_SECS", "60")?;
    let rate_limit_max_calls = parse_u32("VELOSYNC_RATE_LIMIT_MAX_CALLS", "30")?;
    let rate_limit_window_secs = parse_u64("VELOSYNC_RATE_LIMIT_WINDOW_SECS", "60")?;

    let emergency_consecutive_errors = parse_u32("VELOSYNC_EMERGENCY_CONSECUTIVE_ERRORS", "10")?;
    let emergency_min_samples = parse_u32("VELOSYNC_EMERGENCY_MIN_SAMPLES", "20")?;

    let sync_cron = or_default("VELOSYNC_SYNC_CRON", "0 */5 * * * *");
    let force_sync_wait_secs = parse_u64("VELOSYNC_FORCE_SYNC_WAIT_SECS", "30")?;
    let sync_block_on_any_error = parse_bool("VELOSYNC_SYNC_BLOCK_ON_ANY_ERROR", "true")?;

    let catalog_page_size = parse_u32("VELOSYNC_CATALOG_PAGE_SIZE", "100")?;
    let catalog_max_pages = parse_u32("VELOSYNC_CATALOG_MAX_PAGES", "50")?;

    let api_rate_limit_max_calls = parse_u32("VELOSYNC_API_RATE_LIMIT_MAX_CALLS", "120")?;
    let api_rate_limit_window_secs = parse_u64("VELOSYNC_API_RATE_LIMIT_WINDOW_SECS", "60")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        upstream_base_url,
        upstream_consumer_key,
        upstream_consumer_secret,
        catalog_timeout_secs,
        entity_timeout_secs,
        max_retries,
        variation_max_retries,
        backoff_base_ms,
        backoff_cap_ms,
        auth_backoff_base_ms,
        breaker_failure_threshold,
        breaker_cooldown_secs,
        rate_limit_max_calls,
        rate_limit_window_secs,
        emergency_consecutive_errors,
        emergency_min_samples,
        sync_cron,
        force_sync_wait_secs,
        sync_block_on_any_error,
        catalog_page_size,
        catalog_max_pages,
        api_rate_limit_max_calls,
        api_rate_limit_window_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
