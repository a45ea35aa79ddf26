//! Circuit breaker and outbound-call rate limiter.
//!
//! The breaker trips OPEN after `failure_threshold` consecutive terminal
//! failures, waits out a cooldown that doubles on repeated trips (capped),
//! then HALF_OPENs to let a single probe sequence through. The rate limiter
//! is an independent fixed window: even a healthy breaker denies a permit
//! once the window's call budget is spent.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use velosync_core::AppConfig;

/// Why a permit was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutionDenied {
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("outbound rate limit exceeded")]
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker, for operator status panels.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Milliseconds since the breaker last opened, while OPEN or HALF_OPEN.
    pub open_for_ms: Option<u64>,
    /// Current cooldown the breaker is waiting out when OPEN.
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive terminal failures before CLOSED trips to OPEN.
    pub failure_threshold: u32,
    /// Initial OPEN cooldown. Doubles on repeated trips, capped at
    /// `cooldown * MAX_COOLDOWN_FACTOR`.
    pub cooldown: Duration,
    /// Maximum calls permitted per rate-limit window.
    pub max_calls_per_window: u32,
    pub window: Duration,
}

impl BreakerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            failure_threshold: config.breaker_failure_threshold,
            cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            max_calls_per_window: config.rate_limit_max_calls,
            window: Duration::from_secs(config.rate_limit_window_secs),
        }
    }
}

const MAX_COOLDOWN_FACTOR: u32 = 8;

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Cooldown for the current/next OPEN period; grows on repeated trips.
    current_cooldown: Duration,
    window_started_at: Instant,
    window_count: u32,
}

/// Gate in front of every outbound upstream call.
///
/// All state lives behind one mutex; every method is a short critical
/// section, safe under concurrent callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        let inner = BreakerInner {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            current_cooldown: config.cooldown,
            window_started_at: Instant::now(),
            window_count: 0,
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Requests a permit for one outbound call.
    ///
    /// An OPEN breaker whose cooldown has elapsed transitions to HALF_OPEN
    /// here and allows the probe through. A granted permit consumes one slot
    /// of the rate-limit window.
    ///
    /// # Errors
    ///
    /// - [`ExecutionDenied::CircuitOpen`] while OPEN inside the cooldown.
    /// - [`ExecutionDenied::RateLimited`] once the window budget is spent.
    pub fn try_acquire(&self) -> Result<(), ExecutionDenied> {
        let mut inner = self.lock();

        if inner.state == BreakerState::Open {
            let elapsed = inner.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
            if elapsed < inner.current_cooldown {
                return Err(ExecutionDenied::CircuitOpen);
            }
            inner.state = BreakerState::HalfOpen;
            tracing::info!(
                cooldown_secs = inner.current_cooldown.as_secs(),
                "circuit breaker cooldown elapsed; half-open for probe"
            );
        }

        if inner.window_started_at.elapsed() >= self.config.window {
            inner.window_started_at = Instant::now();
            inner.window_count = 0;
        }
        if inner.window_count >= self.config.max_calls_per_window {
            return Err(ExecutionDenied::RateLimited);
        }
        inner.window_count += 1;

        Ok(())
    }

    /// Convenience form of [`CircuitBreaker::try_acquire`] matching the
    /// bool contract used by guard-clause callers. Consumes a window slot
    /// when it returns `true`.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.try_acquire().is_ok()
    }

    /// Records a terminal success: failures zeroed, a HALF_OPEN probe closes
    /// the breaker and restores the base cooldown.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state != BreakerState::Closed {
            tracing::info!("circuit breaker closing after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        inner.current_cooldown = self.config.cooldown;
    }

    /// Records a terminal failure.
    ///
    /// A failed HALF_OPEN probe re-opens immediately with a doubled cooldown;
    /// a CLOSED breaker trips once `failure_threshold` is reached.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            BreakerState::HalfOpen => {
                inner.current_cooldown = self.grown_cooldown(inner.current_cooldown);
                self.trip(&mut inner, "probe failed while half-open");
            }
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner, "failure threshold reached");
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Operator escape hatch: forces CLOSED regardless of counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.current_cooldown = self.config.cooldown;
        tracing::info!("circuit breaker manually reset to closed");
    }

    /// Conservative reset on an external network-restored signal.
    ///
    /// Skips the remaining cooldown but only moves OPEN to HALF_OPEN, so the
    /// next call is still a probe rather than a full return to CLOSED.
    pub fn reset_if_network_restored(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::Open {
            inner.state = BreakerState::HalfOpen;
            tracing::info!("network restored signal; circuit breaker half-open for probe");
        }
    }

    #[must_use]
    pub fn status(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for_ms: inner.opened_at.map(|t| {
                u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX)
            }),
            cooldown_ms: u64::try_from(inner.current_cooldown.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn trip(&self, inner: &mut BreakerInner, reason: &str) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        tracing::warn!(
            consecutive_failures = inner.consecutive_failures,
            cooldown_secs = inner.current_cooldown.as_secs(),
            reason,
            "circuit breaker opened"
        );
    }

    fn grown_cooldown(&self, current: Duration) -> Duration {
        let cap = self.config.cooldown * MAX_COOLDOWN_FACTOR;
        (current * 2).min(cap)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Poisoning only matters if a panic happened mid-update; all updates
        // are scalar writes, so the state is still coherent.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
