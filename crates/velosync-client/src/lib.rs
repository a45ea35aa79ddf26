//! Resilient HTTP client for the upstream catalog API.
//!
//! Layered as: gate checks (emergency stop, circuit breaker, rate limiter),
//! then a tiered request timeout, error classification, class-aware retry
//! with exponential backoff, and terminal outcome reporting. See
//! [`CatalogClient`].

mod classify;
mod client;
mod error;
mod retry;
mod types;

pub use classify::Classifier;
pub use client::{CatalogClient, ClientConfig};
pub use error::ClientError;
pub use types::{RawAttribute, RawMeta, RawProduct, RawVariation};
