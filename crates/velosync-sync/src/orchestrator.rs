//! Single-flight sync orchestrator.
//!
//! One pass fetches the full catalog listing, fans out per-product variation
//! fetches, reconciles stock, and commits both output lists to the cache
//! store as one logical unit before emitting a cache-updated notification.
//! At most one pass runs process-wide; concurrent `perform_sync` callers
//! no-op rather than duplicating work. `force_sync` is the operator entry
//! point: it waits out (or forcibly clears) a wedged prior run, clears the
//! cache for a full refresh, and surfaces gate errors instead of swallowing
//! them.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use velosync_client::{CatalogClient, ClientError};
use velosync_core::{AppConfig, ProductKind, SyncStatus};
use velosync_resilience::{CircuitBreaker, ConnectivityMonitor};

use crate::cache::CacheStore;
use crate::reconcile::{reconcile_product, reconcile_variation};

const FORCE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Guard policy applied before a scheduled pass touches the network.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Scheduled syncs abort below this rolling success rate.
    pub min_success_rate: f64,
    /// Minimum rolling-window samples before the rate guard applies.
    pub min_samples: usize,
    /// When set, any outstanding consecutive error blocks scheduled syncs.
    /// Deliberately stricter than the breaker threshold; an independent knob.
    pub block_on_any_error: bool,
    /// Bound on how long `force_sync` waits for a wedged prior run.
    pub force_wait: Duration,
}

impl SyncPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            block_on_any_error: config.sync_block_on_any_error,
            force_wait: Duration::from_secs(config.force_sync_wait_secs),
            ..Self::default()
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            min_success_rate: 0.5,
            min_samples: 5,
            block_on_any_error: true,
            force_wait: Duration::from_secs(30),
        }
    }
}

/// Why a scheduled pass declined to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmergencyStop,
    /// An unresolved consecutive error is outstanding.
    RecentErrors,
    LowSuccessRate,
    /// The listing came back empty. Treated as a transient upstream fault,
    /// not as a catalog that genuinely lost every product.
    EmptyCatalog,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::EmergencyStop => "emergency stop active",
            Self::RecentErrors => "recent upstream errors",
            Self::LowSuccessRate => "success rate below threshold",
            Self::EmptyCatalog => "empty catalog",
        };
        f.write_str(label)
    }
}

/// Terminal state of one `perform_sync` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed {
        products: usize,
        variations: usize,
    },
    /// Another pass holds the single-flight guard; nothing was done.
    AlreadyRunning,
    Skipped(SkipReason),
    /// A network-class failure was swallowed; cached data stays in service.
    Failed {
        error: String,
    },
}

/// Notification published after each cache commit.
#[derive(Debug, Clone)]
pub struct CacheUpdated {
    pub at: DateTime<Utc>,
    pub products: usize,
    pub variations: usize,
}

#[derive(Debug)]
struct RunState {
    is_running: bool,
    started_at: Option<Instant>,
    last_sync_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

enum Pass {
    Committed { products: usize, variations: usize },
    Empty,
}

/// Drives the catalog refresh cycle against injected collaborators.
pub struct SyncOrchestrator {
    client: CatalogClient,
    cache: Arc<dyn CacheStore>,
    breaker: Arc<CircuitBreaker>,
    monitor: Arc<ConnectivityMonitor>,
    policy: SyncPolicy,
    state: Mutex<RunState>,
    events: broadcast::Sender<CacheUpdated>,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        client: CatalogClient,
        cache: Arc<dyn CacheStore>,
        breaker: Arc<CircuitBreaker>,
        monitor: Arc<ConnectivityMonitor>,
        policy: SyncPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            client,
            cache,
            breaker,
            monitor,
            policy,
            state: Mutex::new(RunState {
                is_running: false,
                started_at: None,
                last_sync_time: None,
                last_error: None,
            }),
            events,
        }
    }

    /// Runs one scheduled sync pass.
    ///
    /// No-ops when a pass is already running and aborts at the guard points
    /// (emergency stop, outstanding errors, collapsed success rate) without
    /// touching the network. Network-class failures are swallowed into
    /// [`SyncOutcome::Failed`]; cached data stays in service.
    ///
    /// # Errors
    ///
    /// Re-raises only non-network errors (deserialization, pagination cap,
    /// configuration), which indicate a contract problem rather than a
    /// connectivity blip.
    pub async fn perform_sync(&self) -> Result<SyncOutcome, ClientError> {
        if let Some(reason) = self.guard_reason() {
            tracing::info!(reason = ?reason, "sync pass skipped by guard policy");
            return Ok(SyncOutcome::Skipped(reason));
        }
        if !self.try_begin() {
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let result = self.run_pass().await;
        self.finish_swallowing(result)
    }

    /// Operator-initiated full refresh.
    ///
    /// Waits up to the configured bound for a prior run to finish; a run
    /// still wedged past the bound has its flag forcibly cleared. The
    /// refresh replaces the cache in one overwrite at the end of the pass,
    /// so a force that is denied or fetches nothing leaves the last good
    /// snapshot in service.
    ///
    /// # Errors
    ///
    /// Unlike [`SyncOrchestrator::perform_sync`], every classified failure
    /// is surfaced, including [`ClientError::EmergencyStop`],
    /// [`ClientError::CircuitOpen`] and [`ClientError::RateLimited`], since
    /// an explicit operator action must not fail silently.
    pub async fn force_sync(&self) -> Result<SyncOutcome, ClientError> {
        // Fail fast without contending for the run flag.
        if self.monitor.is_emergency_stop_active() {
            return Err(ClientError::EmergencyStop);
        }
        self.claim_run_flag().await;

        let result = self.run_pass().await;
        let mut state = self.lock_state();
        state.is_running = false;
        state.started_at = None;
        match result {
            Ok(Pass::Committed {
                products,
                variations,
            }) => {
                state.last_sync_time = Some(Utc::now());
                state.last_error = None;
                drop(state);
                tracing::info!(products, variations, "forced sync committed");
                Ok(SyncOutcome::Completed {
                    products,
                    variations,
                })
            }
            Ok(Pass::Empty) => {
                tracing::warn!("forced sync fetched an empty catalog; cache left unchanged");
                Ok(SyncOutcome::Skipped(SkipReason::EmptyCatalog))
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                drop(state);
                Err(e)
            }
        }
    }

    /// Hook for an external connectivity-restored signal (e.g. the runtime's
    /// online event): conservatively resets the breaker, then attempts an
    /// opportunistic pass under the normal guards.
    ///
    /// # Errors
    ///
    /// Same contract as [`SyncOrchestrator::perform_sync`].
    pub async fn notify_network_restored(&self) -> Result<SyncOutcome, ClientError> {
        self.breaker.reset_if_network_restored();
        self.perform_sync().await
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let state = self.lock_state();
        SyncStatus {
            is_running: state.is_running,
            last_sync_time: state.last_sync_time,
            error: state.last_error.clone(),
        }
    }

    /// Subscribes to cache-updated notifications. Readers re-read the cache
    /// store on each event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdated> {
        self.events.subscribe()
    }

    fn guard_reason(&self) -> Option<SkipReason> {
        if self.monitor.is_emergency_stop_active() {
            return Some(SkipReason::EmergencyStop);
        }
        let sample = self.monitor.status();
        if self.policy.block_on_any_error && sample.consecutive_errors >= 1 {
            return Some(SkipReason::RecentErrors);
        }
        if sample.window_len >= self.policy.min_samples
            && sample.success_rate < self.policy.min_success_rate
        {
            return Some(SkipReason::LowSuccessRate);
        }
        None
    }

    /// Claims the single-flight flag, returning `false` if already held.
    fn try_begin(&self) -> bool {
        let mut state = self.lock_state();
        if state.is_running {
            return false;
        }
        state.is_running = true;
        state.started_at = Some(Instant::now());
        true
    }

    /// Waits for a prior run to release the flag, then claims it. A run
    /// wedged past `force_wait` loses its flag, the safety valve against a
    /// pass that never finished releasing.
    async fn claim_run_flag(&self) {
        let deadline = Instant::now() + self.policy.force_wait;
        loop {
            {
                let mut state = self.lock_state();
                if !state.is_running {
                    state.is_running = true;
                    state.started_at = Some(Instant::now());
                    return;
                }
                if Instant::now() >= deadline {
                    let running_for = state.started_at.map(|t| t.elapsed());
                    tracing::warn!(
                        ?running_for,
                        "prior sync run wedged past the force-sync bound; taking over the flag"
                    );
                    state.started_at = Some(Instant::now());
                    return;
                }
            }
            tokio::time::sleep(FORCE_POLL_INTERVAL).await;
        }
    }

    /// One full pass: list, reconcile, commit, notify.
    async fn run_pass(&self) -> Result<Pass, ClientError> {
        let raw_products = self.client.fetch_catalog().await?;
        if raw_products.is_empty() {
            // An empty listing from a live rental catalog is almost always a
            // transient upstream fault; wiping a good cache over it is worse
            // than serving data one cycle stale.
            return Ok(Pass::Empty);
        }

        let mut products = Vec::new();
        let mut variations = Vec::new();

        for raw in &raw_products {
            if raw.status != "publish" {
                tracing::debug!(product_id = raw.id, status = %raw.status, "skipping unpublished product");
                continue;
            }
            let mut product = reconcile_product(raw);
            match product.kind {
                ProductKind::Variable => {
                    match self.client.fetch_variations(raw.id).await {
                        Ok(raw_variations) => {
                            let resolved: Vec<_> = raw_variations
                                .iter()
                                .map(|v| reconcile_variation(raw.id, v))
                                .collect();
                            // The parent's own figure is never trusted for
                            // variable products.
                            product.stock_quantity =
                                resolved.iter().map(|v| v.stock_quantity).sum();
                            product.variation_ids = resolved.iter().map(|v| v.id).collect();
                            variations.extend(resolved);
                        }
                        // A gate slammed shut mid-pass; continuing would
                        // hammer a breaker that just opened.
                        Err(
                            e @ (ClientError::EmergencyStop
                            | ClientError::CircuitOpen
                            | ClientError::RateLimited),
                        ) => return Err(e),
                        Err(e) if e.is_network_class() => {
                            tracing::warn!(
                                product_id = raw.id,
                                error = %e,
                                "variation fetch failed; keeping the listing's own figure for this product"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                    products.push(product);
                }
                ProductKind::Simple => {
                    if product.stock_quantity <= 0 {
                        tracing::debug!(
                            product_id = raw.id,
                            "skipping out-of-stock simple product"
                        );
                        continue;
                    }
                    products.push(product);
                }
            }
        }

        let (product_count, variation_count) = (products.len(), variations.len());
        // Both lists land in one write: readers never see products refreshed
        // without their variations.
        self.cache.write(products, variations);
        let _ = self.events.send(CacheUpdated {
            at: Utc::now(),
            products: product_count,
            variations: variation_count,
        });
        Ok(Pass::Committed {
            products: product_count,
            variations: variation_count,
        })
    }

    /// Releases the run flag and maps the pass result, swallowing
    /// network-class failures.
    fn finish_swallowing(&self, result: Result<Pass, ClientError>) -> Result<SyncOutcome, ClientError> {
        let mut state = self.lock_state();
        state.is_running = false;
        state.started_at = None;
        match result {
            Ok(Pass::Committed {
                products,
                variations,
            }) => {
                state.last_sync_time = Some(Utc::now());
                state.last_error = None;
                drop(state);
                tracing::info!(products, variations, "sync pass committed");
                Ok(SyncOutcome::Completed {
                    products,
                    variations,
                })
            }
            Ok(Pass::Empty) => {
                drop(state);
                tracing::warn!("catalog listing was empty; keeping the existing cache");
                Ok(SyncOutcome::Skipped(SkipReason::EmptyCatalog))
            }
            Err(e) if e.is_network_class() => {
                let message = e.to_string();
                state.last_error = Some(message.clone());
                drop(state);
                tracing::warn!(error = %message, "sync pass failed on connectivity; serving cached data");
                Ok(SyncOutcome::Failed { error: message })
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                drop(state);
                Err(e)
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
