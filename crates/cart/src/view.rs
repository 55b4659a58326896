//! Cart view model.
//!
//! Pure derivation from the reconciled cart and the pending table. Totals are
//! summed at full precision; rounding happens only in the `display_*`
//! helpers.

use rust_decimal::Decimal;
use shopez_core::{CartLineItem, CurrencyCode, PendingOperation, Price};

use crate::coordinator::PendingTable;
use crate::reconcile::Cart;

/// Cart aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CartTotals {
    /// Sum of quantities.
    pub item_count: u64,
    /// Sum of `unit_price × quantity`, unrounded.
    pub total_price: Decimal,
}

impl CartTotals {
    #[must_use]
    pub fn of(cart: &Cart) -> Self {
        Self {
            item_count: cart.item_count(),
            total_price: cart.total_price(),
        }
    }

    /// Total price rounded to currency precision, with symbol.
    #[must_use]
    pub fn display_price(&self, currency: CurrencyCode) -> String {
        Price::new(self.total_price, currency).display()
    }
}

/// One rendered cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub item: CartLineItem,
    pub subtotal: Decimal,
    /// Operation in flight for this line; controls should be disabled while set.
    pub pending: Option<PendingOperation>,
}

impl LineView {
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn display_unit_price(&self, currency: CurrencyCode) -> String {
        Price::new(self.item.unit_price, currency).display()
    }

    #[must_use]
    pub fn display_subtotal(&self, currency: CurrencyCode) -> String {
        Price::new(self.subtotal, currency).display()
    }
}

/// What the cart screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartView {
    /// No snapshot yet.
    Loading,
    /// Confirmed empty.
    Empty,
    /// At least one line.
    Items {
        /// Lines in display order.
        lines: Vec<LineView>,
        totals: CartTotals,
    },
}

impl CartView {
    /// Derive the view. `None` means no snapshot has arrived yet.
    #[must_use]
    pub fn derive(cart: Option<&Cart>, pending: &PendingTable) -> Self {
        let Some(cart) = cart else {
            return Self::Loading;
        };
        if cart.is_empty() {
            return Self::Empty;
        }

        let lines = cart
            .items()
            .map(|item| LineView {
                subtotal: item.subtotal(),
                pending: pending.get(&item.product_id).copied(),
                item: item.clone(),
            })
            .collect();

        Self::Items {
            lines,
            totals: CartTotals::of(cart),
        }
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Aggregates; zero for loading and empty carts.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        match self {
            Self::Items { totals, .. } => *totals,
            Self::Loading | Self::Empty => CartTotals::default(),
        }
    }

    /// Lines in display order; none for loading and empty carts.
    #[must_use]
    pub fn lines(&self) -> &[LineView] {
        match self {
            Self::Items { lines, .. } => lines,
            Self::Loading | Self::Empty => &[],
        }
    }
}
