//! Rolling connectivity monitor with an emergency-stop kill switch.
//!
//! Every terminal outcome of an outbound call is recorded here. The monitor
//! keeps a bounded window of recent outcomes for the success rate and a
//! consecutive-error streak that zeroes on any success. When the streak or
//! the success rate collapses past the configured watermarks, the emergency
//! stop engages and the HTTP client refuses all outbound calls before the
//! circuit breaker is even consulted.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use velosync_core::AppConfig;

/// Success rate below which the emergency stop engages automatically,
/// once `min_samples` outcomes have been observed.
const EMERGENCY_SUCCESS_RATE_FLOOR: f64 = 0.10;

/// Rolling counters exposed to operator tooling and the sync guard policy.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivitySample {
    pub total_requests: u64,
    pub consecutive_errors: u32,
    /// Fraction of successful outcomes over the rolling window, 0.0–1.0.
    /// Reported as 1.0 until the first outcome arrives.
    pub success_rate: f64,
    pub emergency_stop_active: bool,
    /// Number of outcomes currently in the rolling window.
    pub window_len: usize,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Consecutive-error watermark that triggers the emergency stop.
    pub emergency_consecutive_errors: u32,
    /// Minimum window samples before the success-rate trigger applies.
    pub emergency_min_samples: u32,
    /// Bound on the rolling outcome window used for the success rate.
    pub window_capacity: usize,
    /// A consecutive-error streak older than this is stale and is cleared
    /// on the next read, so one failure from hours ago does not keep
    /// blocking scheduled syncs forever.
    pub streak_decay: Duration,
}

impl MonitorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            emergency_consecutive_errors: config.emergency_consecutive_errors,
            emergency_min_samples: config.emergency_min_samples,
            ..Self::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            emergency_consecutive_errors: 10,
            emergency_min_samples: 20,
            window_capacity: 50,
            streak_decay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct MonitorInner {
    total_requests: u64,
    consecutive_errors: u32,
    last_failure_at: Option<Instant>,
    /// Rolling window of outcomes, `true` for success.
    window: VecDeque<bool>,
    emergency_stop: bool,
}

/// Process-wide tally of outbound-call outcomes.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    config: MonitorConfig,
    inner: Mutex<MonitorInner>,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let inner = Mutex::new(MonitorInner {
            total_requests: 0,
            consecutive_errors: 0,
            last_failure_at: None,
            window: VecDeque::with_capacity(config.window_capacity),
            emergency_stop: false,
        });
        Self { config, inner }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.consecutive_errors = 0;
        inner.last_failure_at = None;
        self.push_outcome(&mut inner, true);
    }

    pub fn record_timeout(&self) {
        self.record_error_outcome();
    }

    /// Records a network-layer failure.
    ///
    /// Failures attributed to unrelated third-party page instrumentation do
    /// not count against the tally at all; they are noise, not upstream
    /// connectivity signal.
    pub fn record_network_error(&self, is_third_party: bool) {
        if is_third_party {
            tracing::debug!("ignoring third-party interference error in connectivity tally");
            return;
        }
        self.record_error_outcome();
    }

    #[must_use]
    pub fn status(&self) -> ConnectivitySample {
        let mut inner = self.lock();
        self.decay_stale_streak(&mut inner);
        ConnectivitySample {
            total_requests: inner.total_requests,
            consecutive_errors: inner.consecutive_errors,
            success_rate: Self::success_rate(&inner),
            emergency_stop_active: inner.emergency_stop,
            window_len: inner.window.len(),
        }
    }

    /// Clears all counters and disengages the emergency stop. Operator action.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.total_requests = 0;
        inner.consecutive_errors = 0;
        inner.last_failure_at = None;
        inner.window.clear();
        inner.emergency_stop = false;
        tracing::info!("connectivity metrics reset");
    }

    #[must_use]
    pub fn is_emergency_stop_active(&self) -> bool {
        self.lock().emergency_stop
    }

    pub fn activate_emergency_stop(&self) {
        let mut inner = self.lock();
        if !inner.emergency_stop {
            inner.emergency_stop = true;
            tracing::warn!("emergency stop activated; all outbound calls refused");
        }
    }

    pub fn disable_emergency_stop(&self) {
        let mut inner = self.lock();
        if inner.emergency_stop {
            inner.emergency_stop = false;
            tracing::info!("emergency stop disabled");
        }
    }

    fn record_error_outcome(&self) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.consecutive_errors = inner.consecutive_errors.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());
        self.push_outcome(&mut inner, false);

        let streak_tripped = inner.consecutive_errors >= self.config.emergency_consecutive_errors;
        let rate_tripped = inner.window.len() >= self.config.emergency_min_samples as usize
            && Self::success_rate(&inner) < EMERGENCY_SUCCESS_RATE_FLOOR;

        if (streak_tripped || rate_tripped) && !inner.emergency_stop {
            inner.emergency_stop = true;
            tracing::error!(
                consecutive_errors = inner.consecutive_errors,
                success_rate = Self::success_rate(&inner),
                "emergency stop auto-activated"
            );
        }
    }

    fn push_outcome(&self, inner: &mut MonitorInner, success: bool) {
        if inner.window.len() >= self.config.window_capacity {
            inner.window.pop_front();
        }
        inner.window.push_back(success);
    }

    fn decay_stale_streak(&self, inner: &mut MonitorInner) {
        if let Some(at) = inner.last_failure_at {
            if at.elapsed() >= self.config.streak_decay {
                inner.consecutive_errors = 0;
                inner.last_failure_at = None;
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn success_rate(inner: &MonitorInner) -> f64 {
        if inner.window.is_empty() {
            return 1.0;
        }
        let successes = inner.window.iter().filter(|s| **s).count();
        successes as f64 / inner.window.len() as f64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
