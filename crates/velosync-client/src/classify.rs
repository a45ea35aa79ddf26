//! Error classification rules for the resilient client.
//!
//! Classification decides two things per terminal error: whether another
//! attempt is worth making (and with which backoff schedule), and whether the
//! failure should count against the connectivity monitor. The third-party
//! interference heuristic is kept here as one inspectable rule set rather
//! than string matching scattered through the client.

use crate::error::ClientError;

/// Retry schedule selected for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryClass {
    /// Network/timeout/5xx: standard exponential backoff.
    Transient,
    /// HTTP 403: possibly a transient authentication race upstream; retried
    /// on a longer backoff base before escalating to [`ClientError::Auth`].
    AuthRace,
    /// Unrelated page instrumentation broke the request; minimal fixed
    /// backoff and excluded from the connectivity tally.
    ThirdParty,
    /// Retrying cannot change the outcome.
    NoRetry,
}

/// Substring markers identifying errors caused by unrelated third-party
/// instrumentation rather than the upstream API itself.
///
/// The list is deliberately conservative: a false positive here would hide a
/// genuine connectivity failure from the monitor.
const INTERFERENCE_MARKERS: &[&str] = &[
    "gtag",
    "google-analytics",
    "googletagmanager",
    "fbevents",
    "facebook.net",
    "hotjar",
    "adsbygoogle",
    "chrome-extension",
];

/// Classifier applied to every terminal error inside the retry loop.
#[derive(Debug, Clone)]
pub struct Classifier {
    markers: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            markers: INTERFERENCE_MARKERS
                .iter()
                .map(|m| (*m).to_owned())
                .collect(),
        }
    }
}

impl Classifier {
    /// Builds a classifier with a custom marker list, replacing the default
    /// interference rule set.
    #[must_use]
    pub fn with_markers(markers: Vec<String>) -> Self {
        Self { markers }
    }

    /// Returns `true` if `detail` matches the interference rule set.
    #[must_use]
    pub fn is_third_party_interference(&self, detail: &str) -> bool {
        let lowered = detail.to_lowercase();
        self.markers.iter().any(|m| lowered.contains(m.as_str()))
    }

    /// Converts a transport-level `reqwest` failure into a classified
    /// [`ClientError`].
    pub(crate) fn classify_transport(&self, url: &str, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            return ClientError::Timeout {
                url: url.to_owned(),
            };
        }
        let detail = error_chain(&err);
        if self.is_third_party_interference(&detail) {
            return ClientError::ThirdPartyInterference { detail };
        }
        ClientError::Network {
            url: url.to_owned(),
            source: err,
        }
    }

    /// Picks the retry schedule for a classified error.
    pub(crate) fn retry_class(&self, err: &ClientError) -> RetryClass {
        match err {
            ClientError::Timeout { .. } | ClientError::Network { .. } => RetryClass::Transient,
            ClientError::HttpStatus { status, .. } if *status >= 500 => RetryClass::Transient,
            ClientError::HttpStatus { status, .. } if *status == 403 => RetryClass::AuthRace,
            ClientError::ThirdPartyInterference { .. } => RetryClass::ThirdParty,
            _ => RetryClass::NoRetry,
        }
    }
}

/// Renders the full source chain of a transport error for rule matching.
fn error_chain(err: &reqwest::Error) -> String {
    use std::error::Error as _;
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        detail.push_str(": ");
        detail.push_str(&s.to_string());
        source = s.source();
    }
    detail
}
