use thiserror::Error;

/// Errors surfaced by the resilient catalog client.
///
/// The first three gate variants ([`ClientError::EmergencyStop`],
/// [`ClientError::CircuitOpen`], [`ClientError::RateLimited`]) are raised
/// before any network I/O happens. The rest classify terminal outcomes of an
/// attempted call after retries are exhausted.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Emergency stop is engaged; no outbound call was attempted.
    #[error("emergency stop active; outbound calls refused")]
    EmergencyStop,

    /// Circuit breaker is open; no outbound call was attempted.
    #[error("circuit breaker open; outbound call denied")]
    CircuitOpen,

    /// Outbound rate-limit window is saturated; no call was attempted.
    #[error("outbound rate limit exceeded")]
    RateLimited,

    /// The request did not complete within its timeout tier.
    #[error("request timed out: {url}")]
    Timeout { url: String },

    /// Network-layer failure (DNS, connect, reset) from the HTTP stack.
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream returned a non-2xx status that is not handled elsewhere.
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// HTTP 403 persisted through the extended auth-race backoff.
    #[error("authentication rejected by upstream: {url}")]
    Auth { url: String },

    /// Failure attributed to unrelated page instrumentation, not upstream
    /// connectivity. Never counted against the connectivity monitor.
    #[error("third-party script interference: {detail}")]
    ThirdPartyInterference { detail: String },

    /// Response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Paged catalog listing exceeded the configured page cap.
    #[error("catalog listing exceeded {max_pages} pages; refusing to continue")]
    PaginationLimit { max_pages: u32 },

    #[error("invalid upstream base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The underlying `reqwest::Client` could not be constructed.
    #[error("HTTP client construction failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Returns `true` for the failure classes the sync orchestrator swallows:
    /// connectivity problems that leave the cached catalog in service.
    ///
    /// 5xx statuses are upstream infrastructure trouble and count as network
    /// class; other statuses (and deserialize/pagination errors) indicate a
    /// contract or configuration problem and are re-raised to the caller.
    #[must_use]
    pub fn is_network_class(&self) -> bool {
        match self {
            ClientError::EmergencyStop
            | ClientError::CircuitOpen
            | ClientError::RateLimited
            | ClientError::Timeout { .. }
            | ClientError::Network { .. }
            | ClientError::Auth { .. }
            | ClientError::ThirdPartyInterference { .. } => true,
            ClientError::HttpStatus { status, .. } => *status >= 500,
            ClientError::Deserialize { .. }
            | ClientError::PaginationLimit { .. }
            | ClientError::InvalidBaseUrl { .. }
            | ClientError::Http(_) => false,
        }
    }
}
