//! ShopEZ Core - Shared cart types.
//!
//! This crate provides the types shared by every ShopEZ component:
//! - `cart` - Cart synchronization engine (store access, reconciliation, mutations)
//! - `cli` - Command-line tools for inspecting and editing carts
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no store access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, line items, and pending-operation states

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
