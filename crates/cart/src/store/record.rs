//! Wire format of one cart line item in the remote store.
//!
//! Records live at `carts/{userId}/{productId}` and always carry every field:
//!
//! ```json
//! {
//!   "id": 7,
//!   "title": "Mens Casual Slim Fit",
//!   "price": 15.99,
//!   "image": "https://fakestoreapi.com/img/71YXzeOuslL._AC_UY879_.jpg",
//!   "category": "men's clothing",
//!   "quantity": 2,
//!   "addedAt": "2025-06-01T12:00:00.000Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopez_core::{CartLineItem, ProductId};
use thiserror::Error;

/// A snapshot entry that failed validation.
///
/// Advisory only: the entry is dropped and the rest of the snapshot is
/// still applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed cart entry {key}: {reason}")]
pub struct MalformedEntry {
    /// Store key of the rejected entry.
    pub key: String,
    /// Why the entry was rejected.
    pub reason: MalformedReason,
}

/// Validation failure for one raw record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    /// Missing field or wrong JSON type.
    #[error("bad shape: {0}")]
    Shape(String),

    /// Quantity below 1 or out of range.
    #[error("invalid quantity {0}")]
    InvalidQuantity(i64),

    /// Unit price below zero.
    #[error("negative price {0}")]
    NegativePrice(Decimal),

    /// Price times quantity, or the cart total, exceeds what a `Decimal` holds.
    #[error("price {0} overflows the cart total")]
    PriceOverflow(Decimal),

    /// Embedded id disagrees with the record key.
    #[error("id {id} does not match key")]
    IdMismatch {
        /// The id stored inside the record.
        id: String,
    },
}

/// Serialized form of a [`CartLineItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemRecord {
    #[serde(with = "record_id")]
    id: String,
    title: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    price: Decimal,
    image: String,
    category: String,
    quantity: i64,
    added_at: DateTime<Utc>,
}

/// Encode a line item as a complete store record.
///
/// # Errors
///
/// Returns an error if the record cannot be represented as JSON.
pub fn encode(item: &CartLineItem) -> Result<Value, serde_json::Error> {
    serde_json::to_value(LineItemRecord {
        id: item.product_id.to_string(),
        title: item.title.clone(),
        price: item.unit_price,
        image: item.image.clone(),
        category: item.category.clone(),
        quantity: i64::from(item.quantity),
        added_at: item.added_at,
    })
}

/// Validate a raw record stored under `key`.
///
/// # Errors
///
/// Returns a [`MalformedEntry`] describing the first problem found.
pub fn decode(key: &str, raw: &Value) -> Result<CartLineItem, MalformedEntry> {
    let malformed = |reason| MalformedEntry {
        key: key.to_string(),
        reason,
    };

    let record = LineItemRecord::deserialize(raw)
        .map_err(|e| malformed(MalformedReason::Shape(e.to_string())))?;

    if record.id != key {
        return Err(malformed(MalformedReason::IdMismatch { id: record.id }));
    }

    let quantity = u32::try_from(record.quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| malformed(MalformedReason::InvalidQuantity(record.quantity)))?;

    if record.price.is_sign_negative() && !record.price.is_zero() {
        return Err(malformed(MalformedReason::NegativePrice(record.price)));
    }

    let item = CartLineItem {
        product_id: ProductId::new(record.id),
        title: record.title,
        image: record.image,
        category: record.category,
        unit_price: record.price,
        quantity,
        added_at: record.added_at,
    };
    if item.checked_subtotal().is_none() {
        return Err(malformed(MalformedReason::PriceOverflow(item.unit_price)));
    }

    Ok(item)
}

/// Record ids are written as JSON integers when the key is numeric, matching
/// the catalog's product ids, and accepted as either integers or strings.
mod record_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
        match id.parse::<u64>() {
            Ok(n) if n.to_string() == id => serializer.serialize_u64(n),
            _ => serializer.serialize_str(id),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        })
    }
}
