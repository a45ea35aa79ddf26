//! Failure-containment primitives for the catalog sync engine.
//!
//! Two independent gates sit in front of every outbound call to the upstream
//! catalog API:
//!
//! - [`CircuitBreaker`]: a CLOSED/OPEN/HALF_OPEN state machine that blocks
//!   calls after repeated failures and probes for recovery after a cooldown,
//!   with a fixed-window rate limiter folded into the same permit check.
//! - [`ConnectivityMonitor`]: a rolling success/failure window with an
//!   emergency-stop kill switch, a more severe gate than the breaker that is
//!   consulted first and stops runaway retry storms outright.
//!
//! Both are explicitly constructed service objects holding their own state
//! behind a single mutex, passed into the orchestrator rather than accessed
//! as ambient globals, so tests can build throwaway instances.

mod breaker;
mod monitor;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, CircuitSnapshot, ExecutionDenied};
pub use monitor::{ConnectivityMonitor, ConnectivitySample, MonitorConfig};
