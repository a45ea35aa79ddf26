//! Stock reconciliation across contradictory inventory sources.
//!
//! The upstream catalog carries up to three stock readings per entity: the
//! primary platform field, a multi-location inventory extension (stock split
//! across storage locations, JSON-encoded), and a single-value standard
//! extension override. These routinely disagree. Reconciliation is pure and
//! deterministic given the raw metadata: it scans the metadata bag, filters
//! out keys belonging to unrelated third-party extensions, and resolves one
//! authoritative quantity by the documented priority order.
//!
//! Priority, highest first:
//! 1. multi-location sum, if the field parses and the sum is positive;
//! 2. standard extension stock value;
//! 3. zero, when the extension marks the item managed but leaves it unset;
//! 4. the primary platform field.
//!
//! Malformed multi-location JSON never aborts a pass; it logs and falls
//! through to the next tier. Negative and non-numeric values coerce to 0.

use velosync_client::{RawMeta, RawProduct, RawVariation};
use velosync_core::{AttributeSelection, CatalogProduct, CatalogVariation, MetaEntry, ProductKind};

/// Metadata key carrying the multi-location inventory extension payload.
const MULTI_LOCATION_KEY: &str = "_stock_at_locations";

/// Metadata key carrying the standard extension's single stock override.
const STANDARD_EXTENSION_KEY: &str = "_ext_stock";

/// Marker key: `"yes"` means the extension manages this item's stock even
/// when no override value is present.
const MANAGED_MARKER_KEY: &str = "_ext_manage_stock";

/// Key prefixes of unrelated third-party extensions whose metadata must not
/// be mistaken for inventory fields.
const THIRD_PARTY_PREFIXES: &[&str] = &["_yoast", "_elementor", "_jetpack", "_aioseo", "_wpml"];

/// Where a candidate stock reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Primary,
    MultiLocation,
    StandardExtension,
}

/// One candidate stock reading. Transient: produced and consumed inside a
/// single reconciliation call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySignal {
    pub source: SignalSource,
    pub value: i64,
}

/// Resolves the authoritative stock quantity for one product or variation.
#[must_use]
pub fn resolve_stock(entity_id: i64, primary: Option<i64>, meta: &[RawMeta]) -> i64 {
    if let Some(signal) = extension_signal(entity_id, meta) {
        return signal.value;
    }
    coerce_quantity_i64(primary)
}

/// Scans the metadata bag for a genuine inventory-extension reading.
///
/// Returns `None` when no extension field applies, in which case the caller
/// falls back to the primary platform field.
fn extension_signal(entity_id: i64, meta: &[RawMeta]) -> Option<InventorySignal> {
    let relevant: Vec<&RawMeta> = meta
        .iter()
        .filter(|m| !is_third_party_key(&m.key))
        .collect();

    if let Some(entry) = relevant.iter().find(|m| m.key == MULTI_LOCATION_KEY) {
        match multi_location_sum(&entry.value) {
            Some(sum) if sum > 0 => {
                return Some(InventorySignal {
                    source: SignalSource::MultiLocation,
                    value: sum,
                });
            }
            Some(_) => {} // zero-sum multi-location yields to the next tier
            None => {
                tracing::warn!(
                    entity_id,
                    "malformed multi-location inventory payload; falling through"
                );
            }
        }
    }

    if let Some(entry) = relevant.iter().find(|m| m.key == STANDARD_EXTENSION_KEY) {
        return Some(InventorySignal {
            source: SignalSource::StandardExtension,
            value: coerce_quantity(&entry.value),
        });
    }

    let managed = relevant
        .iter()
        .any(|m| m.key == MANAGED_MARKER_KEY && m.value.as_str() == Some("yes"));
    if managed {
        // Managed but unset: the extension owns this item's stock and has
        // recorded none, so the truthful answer is zero.
        return Some(InventorySignal {
            source: SignalSource::StandardExtension,
            value: 0,
        });
    }

    None
}

fn is_third_party_key(key: &str) -> bool {
    THIRD_PARTY_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Sums all location quantities from the multi-location payload.
///
/// The payload is either a JSON object mapping location name to quantity, a
/// JSON array of quantities (or of objects with a `quantity`/`stock` field),
/// or a JSON-encoded string of either. Returns `None` when it cannot be
/// parsed at all.
fn multi_location_sum(value: &serde_json::Value) -> Option<i64> {
    let parsed_owned;
    let parsed = match value {
        serde_json::Value::String(s) => {
            parsed_owned = serde_json::from_str::<serde_json::Value>(s).ok()?;
            &parsed_owned
        }
        other => other,
    };

    match parsed {
        serde_json::Value::Object(map) => {
            Some(map.values().map(coerce_quantity).sum())
        }
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Object(loc) => loc
                        .get("quantity")
                        .or_else(|| loc.get("stock"))
                        .map_or(0, coerce_quantity),
                    other => coerce_quantity(other),
                })
                .sum(),
        ),
        _ => None,
    }
}

/// Coerces a raw JSON value to a non-negative quantity. Negative and
/// non-numeric values coerce to 0.
#[allow(clippy::cast_possible_truncation)]
fn coerce_quantity(value: &serde_json::Value) -> i64 {
    let parsed = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    };
    parsed.unwrap_or(0).max(0)
}

fn coerce_quantity_i64(value: Option<i64>) -> i64 {
    value.unwrap_or(0).max(0)
}

/// Converts a raw product into its reconciled form.
///
/// For simple products the resolved stock is final. For variable products
/// the value set here is provisional: the orchestrator overwrites it with
/// the sum of resolved variation stocks once those are fetched, because the
/// upstream top-level figure for variable products is known to be stale.
#[must_use]
pub fn reconcile_product(raw: &RawProduct) -> CatalogProduct {
    let kind = if raw.kind == "variable" {
        ProductKind::Variable
    } else {
        ProductKind::Simple
    };
    CatalogProduct {
        id: raw.id,
        name: raw.name.clone(),
        kind,
        status: raw.status.clone(),
        price: raw.price.clone(),
        regular_price: raw.regular_price.clone(),
        sale_price: raw.sale_price.clone(),
        variation_ids: raw.variations.clone(),
        meta: raw.meta_data.iter().map(to_meta_entry).collect(),
        stock_quantity: resolve_stock(raw.id, raw.stock_quantity, &raw.meta_data),
    }
}

/// Converts a raw variation into its reconciled form.
#[must_use]
pub fn reconcile_variation(product_id: i64, raw: &RawVariation) -> CatalogVariation {
    CatalogVariation {
        id: raw.id,
        product_id,
        attributes: raw
            .attributes
            .iter()
            .map(|a| AttributeSelection {
                name: a.name.clone(),
                option: a.option.clone(),
            })
            .collect(),
        price: raw.price.clone(),
        meta: raw.meta_data.iter().map(to_meta_entry).collect(),
        stock_quantity: resolve_stock(raw.id, raw.stock_quantity, &raw.meta_data),
    }
}

fn to_meta_entry(raw: &RawMeta) -> MetaEntry {
    MetaEntry {
        key: raw.key.clone(),
        value: raw.value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, value: serde_json::Value) -> RawMeta {
        serde_json::from_value(serde_json::json!({ "key": key, "value": value }))
            .expect("meta entry should deserialize")
    }

    #[test]
    fn multi_location_array_sum_takes_priority() {
        let bag = vec![
            meta("_stock_at_locations", serde_json::json!([3, 4, 0])),
            meta("_ext_stock", serde_json::json!(99)),
        ];
        assert_eq!(resolve_stock(1, Some(50), &bag), 7);
    }

    #[test]
    fn multi_location_object_values_are_summed() {
        let bag = vec![meta(
            "_stock_at_locations",
            serde_json::json!({"depot": 2, "workshop": 5}),
        )];
        assert_eq!(resolve_stock(1, Some(50), &bag), 7);
    }

    #[test]
    fn json_encoded_string_payload_is_parsed() {
        let bag = vec![meta(
            "_stock_at_locations",
            serde_json::json!("{\"depot\": 3, \"pier\": 4}"),
        )];
        assert_eq!(resolve_stock(1, None, &bag), 7);
    }

    #[test]
    fn location_entries_as_objects_use_quantity_field() {
        let bag = vec![meta(
            "_stock_at_locations",
            serde_json::json!([{"location": "depot", "quantity": 3}, {"location": "pier", "stock": 4}]),
        )];
        assert_eq!(resolve_stock(1, None, &bag), 7);
    }

    #[test]
    fn zero_multi_location_sum_falls_to_standard_extension() {
        let bag = vec![
            meta("_stock_at_locations", serde_json::json!([0, 0])),
            meta("_ext_stock", serde_json::json!(6)),
        ];
        assert_eq!(resolve_stock(1, Some(50), &bag), 6);
    }

    #[test]
    fn malformed_multi_location_json_falls_through_without_panicking() {
        let bag = vec![
            meta("_stock_at_locations", serde_json::json!("{not valid json")),
            meta("_ext_stock", serde_json::json!(4)),
        ];
        assert_eq!(resolve_stock(1, Some(50), &bag), 4);
    }

    #[test]
    fn malformed_multi_location_without_extension_uses_primary() {
        let bag = vec![meta("_stock_at_locations", serde_json::json!("oops"))];
        assert_eq!(resolve_stock(1, Some(12), &bag), 12);
    }

    #[test]
    fn standard_extension_string_value_is_coerced() {
        let bag = vec![meta("_ext_stock", serde_json::json!("8"))];
        assert_eq!(resolve_stock(1, Some(2), &bag), 8);
    }

    #[test]
    fn negative_values_coerce_to_zero() {
        let bag = vec![meta("_ext_stock", serde_json::json!(-3))];
        assert_eq!(resolve_stock(1, Some(2), &bag), 0);
    }

    #[test]
    fn managed_but_unset_resolves_to_zero() {
        let bag = vec![meta("_ext_manage_stock", serde_json::json!("yes"))];
        assert_eq!(resolve_stock(1, Some(9), &bag), 0);
    }

    #[test]
    fn unmanaged_marker_does_not_apply() {
        let bag = vec![meta("_ext_manage_stock", serde_json::json!("no"))];
        assert_eq!(resolve_stock(1, Some(9), &bag), 9);
    }

    #[test]
    fn empty_bag_uses_primary_exactly() {
        assert_eq!(resolve_stock(1, Some(11), &[]), 11);
        assert_eq!(resolve_stock(1, None, &[]), 0);
        assert_eq!(resolve_stock(1, Some(-2), &[]), 0);
    }

    #[test]
    fn third_party_keys_are_ignored() {
        // An SEO plugin key that happens to collide in spirit must not be
        // consulted even if an inventory-looking key appears under it.
        let bag = vec![
            meta("_yoast_stock_at_locations", serde_json::json!([100])),
            meta("_elementor_ext_stock", serde_json::json!(55)),
        ];
        assert_eq!(resolve_stock(1, Some(3), &bag), 3);
    }

    #[test]
    fn reconcile_product_maps_kind_and_stock() {
        let raw: RawProduct = serde_json::from_value(serde_json::json!({
            "id": 10,
            "name": "Cargo Hauler",
            "type": "simple",
            "status": "publish",
            "stock_quantity": 4,
            "meta_data": [{"key": "_ext_stock", "value": 2}]
        }))
        .expect("raw product should deserialize");
        let product = reconcile_product(&raw);
        assert_eq!(product.kind, ProductKind::Simple);
        assert_eq!(product.stock_quantity, 2);
    }

    #[test]
    fn reconcile_variation_keeps_attributes_and_owner() {
        let raw: RawVariation = serde_json::from_value(serde_json::json!({
            "id": 21,
            "stock_quantity": 3,
            "attributes": [{"name": "Frame size", "option": "54cm"}],
            "meta_data": []
        }))
        .expect("raw variation should deserialize");
        let variation = reconcile_variation(10, &raw);
        assert_eq!(variation.product_id, 10);
        assert_eq!(variation.stock_quantity, 3);
        assert_eq!(variation.attributes[0].option, "54cm");
    }
}
