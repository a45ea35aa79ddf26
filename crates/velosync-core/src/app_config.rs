use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,

    /// Base URL of the upstream catalog REST API.
    pub upstream_base_url: String,
    /// Basic-auth credential pair for the upstream API, supplied out-of-band.
    pub upstream_consumer_key: String,
    pub upstream_consumer_secret: String,

    /// Timeout for the bulk catalog listing call.
    pub catalog_timeout_secs: u64,
    /// Timeout for single-entity reads (per-product variation fetches).
    pub entity_timeout_secs: u64,
    pub max_retries: u32,
    /// Retry cap for latency-sensitive per-variation calls.
    pub variation_max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Longer base for possibly-transient HTTP 403 auth races.
    pub auth_backoff_base_ms: u64,

    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
    pub rate_limit_max_calls: u32,
    pub rate_limit_window_secs: u64,

    pub emergency_consecutive_errors: u32,
    pub emergency_min_samples: u32,

    /// Scheduled sync cadence (6-field cron, default every 5 minutes).
    pub sync_cron: String,
    /// Bound on how long `force_sync` waits for a wedged prior run.
    pub force_sync_wait_secs: u64,
    /// When set, any outstanding consecutive error blocks scheduled syncs
    /// until the connectivity metrics are reset. Stricter than the breaker
    /// threshold; kept as an independent knob.
    pub sync_block_on_any_error: bool,

    pub catalog_page_size: u32,
    pub catalog_max_pages: u32,

    /// Inbound budget for the operator API, separate from the outbound
    /// limiter above.
    pub api_rate_limit_max_calls: u32,
    pub api_rate_limit_window_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("upstream_base_url", &self.upstream_base_url)
            .field("upstream_consumer_key", &"[redacted]")
            .field("upstream_consumer_secret", &"[redacted]")
            .field("catalog_timeout_secs", &self.catalog_timeout_secs)
            .field("entity_timeout_secs", &self.entity_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("variation_max_retries", &self.variation_max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_cap_ms", &self.backoff_cap_ms)
            .field("auth_backoff_base_ms", &self.auth_backoff_base_ms)
            .field("breaker_failure_threshold", &self.breaker_failure_threshold)
            .field("breaker_cooldown_secs", &self.breaker_cooldown_secs)
            .field("rate_limit_max_calls", &self.rate_limit_max_calls)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field(
                "emergency_consecutive_errors",
                &self.emergency_consecutive_errors,
            )
            .field("emergency_min_samples", &self.emergency_min_samples)
            .field("sync_cron", &self.sync_cron)
            .field("force_sync_wait_secs", &self.force_sync_wait_secs)
            .field("sync_block_on_any_error", &self.sync_block_on_any_error)
            .field("catalog_page_size", &self.catalog_page_size)
            .field("catalog_max_pages", &self.catalog_max_pages)
            .field("api_rate_limit_max_calls", &self.api_rate_limit_max_calls)
            .field(
                "api_rate_limit_window_secs",
                &self.api_rate_limit_window_secs,
            )
            .finish()
    }
}
