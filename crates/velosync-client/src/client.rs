//! Resilient HTTP client for the upstream catalog REST API.
//!
//! Every logical call runs the same discipline: emergency stop and circuit
//! breaker/rate limiter are consulted before any network I/O, the attempt
//! runs under a tiered timeout, failures are classified and retried on a
//! class-specific backoff, and only the terminal outcome is reported to the
//! breaker and the connectivity monitor. Intermediate retries never touch
//! shared state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use velosync_core::AppConfig;
use velosync_resilience::{CircuitBreaker, ConnectivityMonitor, ExecutionDenied};

use crate::classify::Classifier;
use crate::error::ClientError;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::{RawProduct, RawVariation};

const USER_AGENT: &str = "velosync/0.1 (catalog-sync)";

/// Connection settings and retry policy for [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Timeout for the bulk catalog listing (medium tier).
    pub catalog_timeout: Duration,
    /// Timeout for single-entity reads (short tier).
    pub entity_timeout: Duration,
    pub max_retries: u32,
    /// Retry cap for latency-sensitive per-variation calls.
    pub variation_max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub auth_backoff_base_ms: u64,
    pub page_size: u32,
    pub max_pages: u32,
}

impl ClientConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.upstream_base_url.clone(),
            consumer_key: config.upstream_consumer_key.clone(),
            consumer_secret: config.upstream_consumer_secret.clone(),
            catalog_timeout: Duration::from_secs(config.catalog_timeout_secs),
            entity_timeout: Duration::from_secs(config.entity_timeout_secs),
            max_retries: config.max_retries,
            variation_max_retries: config.variation_max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
            auth_backoff_base_ms: config.auth_backoff_base_ms,
            page_size: config.catalog_page_size,
            max_pages: config.catalog_max_pages,
        }
    }
}

/// HTTP client for the upstream catalog API.
///
/// Shares the process-wide [`CircuitBreaker`] and [`ConnectivityMonitor`]
/// with the orchestrator; both are injected rather than ambient.
pub struct CatalogClient {
    http: Client,
    base_url: Url,
    consumer_key: String,
    consumer_secret: String,
    catalog_timeout: Duration,
    entity_timeout: Duration,
    catalog_policy: RetryPolicy,
    variation_policy: RetryPolicy,
    page_size: u32,
    max_pages: u32,
    classifier: Classifier,
    breaker: Arc<CircuitBreaker>,
    monitor: Arc<ConnectivityMonitor>,
}

impl CatalogClient {
    /// Creates a client from config with the default interference classifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ClientError::InvalidBaseUrl`] if the base
    /// URL does not parse.
    pub fn new(
        config: ClientConfig,
        breaker: Arc<CircuitBreaker>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Result<Self, ClientError> {
        Self::with_classifier(config, breaker, monitor, Classifier::default())
    }

    /// Creates a client with a custom error classifier (testable rule set).
    ///
    /// # Errors
    ///
    /// Same as [`CatalogClient::new`].
    pub fn with_classifier(
        config: ClientConfig,
        breaker: Arc<CircuitBreaker>,
        monitor: Arc<ConnectivityMonitor>,
        classifier: Classifier,
    ) -> Result<Self, ClientError> {
        // Per-request timeouts are tiered, so the builder carries only the
        // connect timeout.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        // Normalise: the base URL must end with exactly one slash so joined
        // paths extend it instead of replacing the last segment.
        let normalised = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let catalog_policy = RetryPolicy {
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
            auth_backoff_base_ms: config.auth_backoff_base_ms,
        };
        let variation_policy = RetryPolicy {
            max_retries: config.variation_max_retries,
            ..catalog_policy.clone()
        };

        Ok(Self {
            http,
            base_url,
            consumer_key: config.consumer_key,
            consumer_secret: config.consumer_secret,
            catalog_timeout: config.catalog_timeout,
            entity_timeout: config.entity_timeout,
            catalog_policy,
            variation_policy,
            page_size: config.page_size,
            max_pages: config.max_pages,
            classifier,
            breaker,
            monitor,
        })
    }

    /// Fetches the full catalog listing, following pagination.
    ///
    /// Each page is one gated call against the breaker and rate limiter.
    ///
    /// # Errors
    ///
    /// - [`ClientError::EmergencyStop`] / [`ClientError::CircuitOpen`] /
    ///   [`ClientError::RateLimited`] when a gate denies before network I/O.
    /// - [`ClientError::PaginationLimit`] if the listing exceeds the page cap.
    /// - Classified terminal errors from the retry loop otherwise.
    pub async fn fetch_catalog(&self) -> Result<Vec<RawProduct>, ClientError> {
        let mut all = Vec::new();
        for page in 1..=self.max_pages {
            let batch = self.fetch_catalog_page(page).await?;
            let len = batch.len();
            all.extend(batch);
            if len < self.page_size as usize {
                return Ok(all);
            }
        }
        // Still receiving full pages at the cap: refuse to pretend the
        // listing is complete.
        Err(ClientError::PaginationLimit {
            max_pages: self.max_pages,
        })
    }

    /// Fetches one page of the catalog listing.
    ///
    /// # Errors
    ///
    /// Gate denials and classified terminal errors, as for
    /// [`CatalogClient::fetch_catalog`].
    pub async fn fetch_catalog_page(&self, page: u32) -> Result<Vec<RawProduct>, ClientError> {
        let url = self.collection_url(
            "products",
            &[
                ("page", &page.to_string()),
                ("per_page", &self.page_size.to_string()),
            ],
        );
        let products: Option<Vec<RawProduct>> = self
            .execute(&self.catalog_policy, &url, self.catalog_timeout)
            .await?;
        Ok(products.unwrap_or_default())
    }

    /// Fetches all variations of a variable product.
    ///
    /// A 404 (product vanished between listing and fetch) resolves to an
    /// empty list, not an error.
    ///
    /// # Errors
    ///
    /// Gate denials and classified terminal errors. Variation reads are
    /// latency sensitive and use the short timeout tier with a single retry.
    pub async fn fetch_variations(
        &self,
        product_id: i64,
    ) -> Result<Vec<RawVariation>, ClientError> {
        let url = self.collection_url(
            &format!("products/{product_id}/variations"),
            &[("per_page", &self.page_size.to_string())],
        );
        let variations: Option<Vec<RawVariation>> = self
            .execute(&self.variation_policy, &url, self.entity_timeout)
            .await?;
        Ok(variations.unwrap_or_default())
    }

    /// Runs one gated, retried call and reports the terminal outcome.
    async fn execute<T: DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        url: &Url,
        timeout: Duration,
    ) -> Result<Option<T>, ClientError> {
        self.gate()?;

        let result = retry_with_backoff(policy, &self.classifier, || {
            self.send_json::<T>(url.clone(), timeout)
        })
        .await;

        self.report_terminal(&result);
        result
    }

    /// Emergency stop first, then breaker/rate-limiter. Denials never touch
    /// the network and are not reported as failures.
    fn gate(&self) -> Result<(), ClientError> {
        if self.monitor.is_emergency_stop_active() {
            return Err(ClientError::EmergencyStop);
        }
        self.breaker.try_acquire().map_err(|denied| match denied {
            ExecutionDenied::CircuitOpen => ClientError::CircuitOpen,
            ExecutionDenied::RateLimited => ClientError::RateLimited,
        })
    }

    /// Reports the terminal outcome of one logical call. Interference-class
    /// failures are excluded from both the breaker and the monitor tally.
    fn report_terminal<T>(&self, result: &Result<T, ClientError>) {
        match result {
            Ok(_) => {
                self.breaker.record_success();
                self.monitor.record_success();
            }
            Err(ClientError::ThirdPartyInterference { detail }) => {
                tracing::debug!(detail, "call lost to third-party interference");
                self.monitor.record_network_error(true);
            }
            Err(ClientError::Timeout { .. }) => {
                self.breaker.record_failure();
                self.monitor.record_timeout();
            }
            // Gate denials never reach the network; nothing to report.
            Err(
                ClientError::EmergencyStop | ClientError::CircuitOpen | ClientError::RateLimited,
            ) => {}
            Err(_) => {
                self.breaker.record_failure();
                self.monitor.record_network_error(false);
            }
        }
    }

    /// One attempt: send, map 404 to `None`, assert 2xx, deserialize.
    async fn send_json<T: DeserializeOwned>(
        &self,
        url: Url,
        timeout: Duration,
    ) -> Result<Option<T>, ClientError> {
        let response = self
            .http
            .get(url.clone())
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.classifier.classify_transport(url.as_str(), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.classifier.classify_transport(url.as_str(), e))?;
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ClientError::Deserialize {
                context: url.to_string(),
                source: e,
            })
    }

    /// Builds a collection URL with percent-encoded query parameters.
    fn collection_url(&self, path: &str, extra: &[(&str, &str)]) -> Url {
        let mut url = self
            .base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone());
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in extra {
                pairs.append_pair(k, v);
            }
        }
        url
    }
}
