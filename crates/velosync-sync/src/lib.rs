//! Catalog synchronization: reconciliation, cache store, and the
//! single-flight orchestrator.

mod cache;
mod orchestrator;
mod reconcile;

pub use cache::{CacheStore, MemoryCache};
pub use orchestrator::{
    CacheUpdated, SkipReason, SyncOrchestrator, SyncOutcome, SyncPolicy,
};
pub use reconcile::{
    reconcile_product, reconcile_variation, resolve_stock, InventorySignal, SignalSource,
};
