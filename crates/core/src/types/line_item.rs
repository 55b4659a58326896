//! Cart line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Catalog data captured when a product is added to a cart.
///
/// The unit price is fixed here and never re-fetched on later updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemMetadata {
    pub product_id: ProductId,
    pub title: String,
    pub image: String,
    pub category: String,
    pub unit_price: Decimal,
}

impl LineItemMetadata {
    /// Build a line item from this metadata.
    #[must_use]
    pub fn into_line_item(self, quantity: u32, added_at: DateTime<Utc>) -> CartLineItem {
        CartLineItem {
            product_id: self.product_id,
            title: self.title,
            image: self.image,
            category: self.category,
            unit_price: self.unit_price,
            quantity,
            added_at,
        }
    }
}

/// A product in a user's cart.
///
/// `quantity` is always at least 1; a line that would drop to zero is
/// deleted instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub title: String,
    pub image: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// First insertion time, preserved across quantity updates.
    pub added_at: DateTime<Utc>,
}

impl CartLineItem {
    /// `unit_price × quantity` at full precision, saturating at `Decimal::MAX`.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.checked_subtotal().unwrap_or(Decimal::MAX)
    }

    /// `unit_price × quantity`, or `None` if it does not fit a `Decimal`.
    #[must_use]
    pub fn checked_subtotal(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    /// Copy of this item with a different quantity; every other field is kept.
    #[must_use]
    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }

    /// The catalog metadata this line was created from.
    #[must_use]
    pub fn metadata(&self) -> LineItemMetadata {
        LineItemMetadata {
            product_id: self.product_id.clone(),
            title: self.title.clone(),
            image: self.image.clone(),
            category: self.category.clone(),
            unit_price: self.unit_price,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn metadata() -> LineItemMetadata {
        LineItemMetadata {
            product_id: ProductId::new("A"),
            title: "Backpack".to_string(),
            image: "https://img.example/a.jpg".to_string(),
            category: "bags".to_string(),
            unit_price: Decimal::from_str("9.99").unwrap(),
        }
    }

    #[test]
    fn test_subtotal_is_exact() {
        let item = metadata().into_line_item(5, Utc::now());
        assert_eq!(item.subtotal(), Decimal::from_str("49.95").unwrap());
    }

    #[test]
    fn test_subtotal_overflow_is_detected() {
        let mut item = metadata().into_line_item(100_000, Utc::now());
        item.unit_price = Decimal::from_str("10000000000000000000000000").unwrap();
        assert!(item.checked_subtotal().is_none());
        assert_eq!(item.subtotal(), Decimal::MAX);
    }

    #[test]
    fn test_with_quantity_preserves_other_fields() {
        let item = metadata().into_line_item(2, Utc::now());
        let updated = item.with_quantity(7);
        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.added_at, item.added_at);
        assert_eq!(updated.metadata(), item.metadata());
    }
}
