//! Cache store contract and the in-memory implementation.
//!
//! The orchestrator only ever talks to the [`CacheStore`] trait, so the same
//! sync logic runs against this in-memory map in tests and a persistent
//! store in production. Each successful pass fully overwrites the cache (no
//! incremental merge): write amplification traded for freshness guarantees.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use velosync_core::{CatalogProduct, CatalogVariation};

/// Key/value persistence seam between the sync engine and its readers.
///
/// `write` commits products and variations as one logical unit together with
/// the sync timestamp, so readers never observe one entity type refreshed
/// without the other.
pub trait CacheStore: Send + Sync {
    fn write(&self, products: Vec<CatalogProduct>, variations: Vec<CatalogVariation>);
    fn read_products(&self) -> Vec<CatalogProduct>;
    fn read_variations(&self) -> Vec<CatalogVariation>;
    fn last_sync_timestamp(&self) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    products: Vec<CatalogProduct>,
    variations: Vec<CatalogVariation>,
    last_sync: Option<DateTime<Utc>>,
}

/// In-memory [`CacheStore`]. The production default for a per-process
/// engine, and the fake for orchestrator tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<MemoryCacheInner>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryCacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CacheStore for MemoryCache {
    fn write(&self, products: Vec<CatalogProduct>, variations: Vec<CatalogVariation>) {
        let mut inner = self.lock();
        inner.products = products;
        inner.variations = variations;
        inner.last_sync = Some(Utc::now());
    }

    fn read_products(&self) -> Vec<CatalogProduct> {
        self.lock().products.clone()
    }

    fn read_variations(&self) -> Vec<CatalogVariation> {
        self.lock().variations.clone()
    }

    fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        self.lock().last_sync
    }
}
