//! ShopEZ cart synchronization engine.
//!
//! Keeps a per-user cart consistent between local state and a remote store
//! that other devices may change at the same time.
//!
//! # Modules
//!
//! - [`store`] - Store port, Firebase and in-memory backends, wire records
//! - [`repository`] - Typed subscribe/read/write/delete over a store
//! - [`reconcile`] - Snapshot to [`Cart`] conversion
//! - [`sync`] - Live subscription task with resubscription backoff
//! - [`coordinator`] - Add, set-quantity and remove with per-item exclusivity
//! - [`view`] - Totals and line views
//! - [`engine`] - Session-scoped facade over all of the above
//! - [`catalog`] - Product catalog client

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod identity;
pub mod reconcile;
pub mod repository;
pub mod store;
pub mod sync;
pub mod view;

pub use config::CartSyncConfig;
pub use coordinator::{MutationCoordinator, PendingTable};
pub use engine::{CartEngine, EngineContext};
pub use error::{CartError, Result};
pub use reconcile::{Cart, Reconciliation, reconcile};
pub use sync::{CartState, CartSubscription, ConnectionStatus};
pub use view::{CartTotals, CartView, LineView};
