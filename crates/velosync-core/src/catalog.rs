//! Reconciled catalog types shared across the sync engine.
//!
//! These are the normalized shapes written to the cache store after a sync
//! pass, not the raw upstream API shapes (those live in `velosync-client`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product kind as reported by the upstream catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    /// A standalone rentable item with its own stock figure.
    Simple,
    /// A parent item whose stock is the sum of its variations.
    Variable,
}

/// One raw metadata entry from the upstream catalog.
///
/// Upstream plugins attach arbitrary key/value pairs here, including the
/// inventory-extension fields the reconciliation pass reads. Values are kept
/// as raw JSON because extension payloads vary (integers, strings,
/// JSON-encoded strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: serde_json::Value,
}

/// A reconciled catalog product ready for the cache store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Upstream numeric product ID.
    pub id: i64,
    pub name: String,
    pub kind: ProductKind,
    /// Upstream publication status, e.g. `"publish"` or `"draft"`.
    pub status: String,
    /// Current price as a decimal string, exactly as upstream returns it.
    pub price: Option<String>,
    pub regular_price: Option<String>,
    pub sale_price: Option<String>,
    /// IDs of owned variations. Empty for simple products.
    pub variation_ids: Vec<i64>,
    /// Raw upstream metadata, preserved for reconciliation and debugging.
    pub meta: Vec<MetaEntry>,
    /// Resolved stock. For variable products this is always the sum of the
    /// owned variations' resolved stock, never the upstream top-level figure.
    pub stock_quantity: i64,
}

impl CatalogProduct {
    /// Returns `true` if the product is published upstream.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == "publish"
    }

    /// Returns `true` if at least one unit is available to rent.
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }
}

/// One attribute selection on a variation, e.g. frame size `"54cm"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSelection {
    pub name: String,
    pub option: String,
}

/// A reconciled variation of a [`CatalogProduct`].
///
/// Exclusively owned by its parent product; never shared between products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogVariation {
    /// Upstream numeric variation ID.
    pub id: i64,
    /// ID of the owning product.
    pub product_id: i64,
    pub attributes: Vec<AttributeSelection>,
    pub price: Option<String>,
    /// Raw upstream metadata, preserved for reconciliation and debugging.
    pub meta: Vec<MetaEntry>,
    /// Resolved stock for this variation.
    pub stock_quantity: i64,
}

/// Snapshot of the orchestrator's sync state, exposed to operator tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_running: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Message from the most recent failed pass, cleared on success.
    pub error: Option<String>,
}
