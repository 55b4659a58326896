//! Snapshot reconciliation.
//!
//! Each snapshot replaces the local cart wholesale. Entries that fail
//! validation are dropped and reported; they never abort reconciliation.

use std::collections::HashMap;

use rust_decimal::Decimal;
use shopez_core::{CartLineItem, ProductId};
use tracing::warn;

use crate::store::CartSnapshot;
use crate::store::record::{self, MalformedEntry, MalformedReason};

/// The reconciled cart of one user.
///
/// Keys are unique product ids. Iteration follows display order: oldest
/// `added_at` first, ties broken by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    items: Vec<CartLineItem>,
    index: HashMap<ProductId, usize>,
}

impl Cart {
    /// Build a cart from line items. A later item replaces an earlier one
    /// with the same product id.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartLineItem>) -> Self {
        let mut unique: HashMap<ProductId, CartLineItem> = HashMap::new();
        for item in items {
            unique.insert(item.product_id.clone(), item);
        }

        let mut items: Vec<CartLineItem> = unique.into_values().collect();
        items.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });

        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.product_id.clone(), i))
            .collect();

        Self { items, index }
    }

    /// Line item for `product`, if present.
    #[must_use]
    pub fn get(&self, product: &ProductId) -> Option<&CartLineItem> {
        self.index.get(product).and_then(|&i| self.items.get(i))
    }

    /// Whether `product` is in the cart.
    #[must_use]
    pub fn contains(&self, product: &ProductId) -> bool {
        self.index.contains_key(product)
    }

    /// Line items in display order.
    pub fn items(&self) -> impl Iterator<Item = &CartLineItem> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of all subtotals at full precision, saturating at `Decimal::MAX`.
    ///
    /// Carts built by [`reconcile`] never saturate.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                total.checked_add(item.checked_subtotal()?)
            })
            .unwrap_or(Decimal::MAX)
    }
}

/// Result of reconciling one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Every valid entry of the snapshot.
    pub cart: Cart,
    /// Entries that were dropped.
    pub malformed: Vec<MalformedEntry>,
}

impl Reconciliation {
    /// Whether any entry was dropped.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.malformed.is_empty()
    }
}

/// Turn a raw snapshot into a cart.
#[must_use]
pub fn reconcile(snapshot: &CartSnapshot) -> Reconciliation {
    let mut valid = Vec::with_capacity(snapshot.len());
    let mut malformed = Vec::new();
    let mut total = Decimal::ZERO;

    for (key, raw) in snapshot.entries() {
        let decoded = record::decode(key, raw).and_then(|item| {
            // decode guarantees the subtotal itself fits
            let subtotal = item.subtotal();
            total = total.checked_add(subtotal).ok_or_else(|| MalformedEntry {
                key: key.clone(),
                reason: MalformedReason::PriceOverflow(item.unit_price),
            })?;
            Ok(item)
        });

        match decoded {
            Ok(item) => valid.push(item),
            Err(entry) => {
                warn!(key = %entry.key, reason = %entry.reason, "dropping malformed cart entry");
                malformed.push(entry);
            }
        }
    }

    Reconciliation {
        cart: Cart::from_items(valid),
        malformed,
    }
}
