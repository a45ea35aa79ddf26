//! Request-scoped middleware for the operator API: request IDs, bearer
//! auth, and a fixed-window limiter guarding the API itself.
//!
//! Denials are emitted through the same [`ApiError`] envelope the handlers
//! use, so every response a client sees carries a request ID.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;
use velosync_core::AppConfig;

use crate::api::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID carried through request extensions and echoed on the response.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer-token auth for the protected routes.
///
/// Tokens are process configuration, not catalog data, so they are read
/// from `VELOSYNC_API_KEYS` directly rather than carried on [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ApiAuth {
    tokens: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl ApiAuth {
    /// Reads `VELOSYNC_API_KEYS` (comma-separated bearer tokens).
    ///
    /// Development tolerates a missing value and runs with auth disabled;
    /// any other environment refuses to start without tokens.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let tokens: HashSet<String> = std::env::var("VELOSYNC_API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        match (tokens.is_empty(), is_development) {
            (false, _) => Ok(Self {
                tokens: Arc::new(tokens),
                enabled: true,
            }),
            (true, true) => {
                tracing::warn!("VELOSYNC_API_KEYS unset; operator API runs unauthenticated");
                Ok(Self {
                    tokens: Arc::new(HashSet::new()),
                    enabled: false,
                })
            }
            (true, false) => anyhow::bail!(
                "VELOSYNC_API_KEYS must list at least one bearer token outside development"
            ),
        }
    }

    /// Auth from an explicit token set; enabled iff the set is non-empty.
    #[must_use]
    pub fn with_keys(tokens: HashSet<String>) -> Self {
        let enabled = !tokens.is_empty();
        Self {
            tokens: Arc::new(tokens),
            enabled,
        }
    }

    fn permits(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

#[derive(Debug)]
struct CallWindow {
    opened_at: Instant,
    calls: u32,
}

/// Fixed-window limiter for the operator API. Distinct from the outbound
/// limiter inside the sync engine: this one shields the process from a
/// runaway dashboard or script, not the upstream from us.
#[derive(Debug, Clone)]
pub struct ApiRateLimit {
    max_calls: u32,
    window: Duration,
    ledger: Arc<Mutex<CallWindow>>,
}

impl ApiRateLimit {
    #[must_use]
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            ledger: Arc::new(Mutex::new(CallWindow {
                opened_at: Instant::now(),
                calls: 0,
            })),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.api_rate_limit_max_calls,
            Duration::from_secs(config.api_rate_limit_window_secs),
        )
    }

    /// Consumes one slot from the current window, rolling the window over
    /// first if it has elapsed. Returns false when the budget is spent.
    fn admit(&self) -> bool {
        let mut ledger = self.lock();
        if ledger.opened_at.elapsed() >= self.window {
            ledger.opened_at = Instant::now();
            ledger.calls = 0;
        }
        if ledger.calls >= self.max_calls {
            return false;
        }
        ledger.calls += 1;
        true
    }

    fn lock(&self) -> MutexGuard<'_, CallWindow> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Attaches a request ID to every request and echoes it on the response.
/// An inbound `x-request-id` header wins over a freshly minted UUID.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Rejects requests without a recognized bearer token, unless auth is
/// disabled for local development.
pub async fn require_bearer_auth(
    State(auth): State<ApiAuth>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }
    let authorized = bearer_token(req.headers()).is_some_and(|token| auth.permits(token));
    if authorized {
        next.run(req).await
    } else {
        deny("unauthorized", "missing or invalid bearer token", &req)
    }
}

/// Rejects requests once the per-window budget is spent.
pub async fn enforce_rate_limit(
    State(limit): State<ApiRateLimit>,
    req: Request,
    next: Next,
) -> Response {
    if limit.admit() {
        next.run(req).await
    } else {
        deny("rate_limited", "operator API rate limit exceeded", &req)
    }
}

fn deny(code: &str, message: &str, req: &Request) -> Response {
    // The request-id layer wraps everything, so the extension is present on
    // any request routed here; the fallback covers direct handler tests.
    let req_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(|| RequestId(Uuid::new_v4().to_string()));
    ApiError::new(code, message, &req_id).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.trim().is_empty())
}
