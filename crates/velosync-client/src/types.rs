//! Raw response shapes from the upstream catalog REST API.
//!
//! ## Observed quirks
//!
//! ### `stock_quantity`
//! May be `null` even when stock management is enabled, and for `variable`
//! products the top-level figure is known to be stale; the engine never
//! trusts it for variable products and recomputes from variations instead.
//!
//! ### `meta_data`
//! Arbitrary plugin key/value pairs. Inventory-extension fields live here
//! alongside unrelated third-party keys (SEO plugins, page builders). Values
//! are sometimes JSON-encoded strings rather than JSON values, so they are
//! kept as raw [`serde_json::Value`] and parsed during reconciliation.
//!
//! ### `price`
//! Decimal string, may be empty (`""`) for variable parents. Passed through
//! as-is; pricing rules are out of scope here.

use serde::Deserialize;

/// A product as returned by `GET /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProduct {
    pub id: i64,
    pub name: String,
    /// `"simple"`, `"variable"`, or other upstream kinds (grouped, external)
    /// that the sync pass skips.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Publication status, e.g. `"publish"`, `"draft"`, `"private"`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub regular_price: Option<String>,
    #[serde(default)]
    pub sale_price: Option<String>,
    /// Primary platform stock figure. `null` when not managed.
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    /// IDs of owned variations; empty for simple products.
    #[serde(default)]
    pub variations: Vec<i64>,
    #[serde(default)]
    pub meta_data: Vec<RawMeta>,
}

/// A variation as returned by `GET /products/{id}/variations`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVariation {
    pub id: i64,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
    #[serde(default)]
    pub meta_data: Vec<RawMeta>,
}

/// One attribute selection on a variation, e.g. `{"name": "Frame size", "option": "54cm"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAttribute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub option: String,
}

/// One upstream metadata entry. `value` is kept raw; extension payloads vary
/// between integers, strings, and JSON-encoded strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMeta {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_deserializes_with_minimal_fields() {
        let raw: RawProduct = serde_json::from_str(
            r#"{"id": 101, "name": "Gravel Explorer", "type": "variable", "status": "publish"}"#,
        )
        .expect("minimal product should parse");
        assert_eq!(raw.id, 101);
        assert_eq!(raw.kind, "variable");
        assert!(raw.variations.is_empty());
        assert!(raw.stock_quantity.is_none());
    }

    #[test]
    fn null_stock_quantity_parses_as_none() {
        let raw: RawProduct = serde_json::from_str(
            r#"{"id": 7, "name": "City Cruiser", "type": "simple", "status": "publish", "stock_quantity": null}"#,
        )
        .expect("null stock should parse");
        assert!(raw.stock_quantity.is_none());
    }

    #[test]
    fn meta_values_stay_raw() {
        let raw: RawVariation = serde_json::from_str(
            r#"{"id": 9, "meta_data": [{"key": "_stock_at_locations", "value": "{\"depot\":3}"}]}"#,
        )
        .expect("variation should parse");
        assert_eq!(raw.meta_data[0].key, "_stock_at_locations");
        assert!(raw.meta_data[0].value.is_string());
    }
}
