//! Core types for ShopEZ.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod id;
pub mod line_item;
pub mod price;
pub mod status;

pub use id::*;
pub use line_item::{CartLineItem, LineItemMetadata};
pub use price::{CurrencyCode, Price};
pub use status::PendingOperation;
