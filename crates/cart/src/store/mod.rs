//! Remote cart store port and backends.
//!
//! # Architecture
//!
//! - The remote store is the single source of truth for cart contents
//! - Records are raw JSON values in the Firebase wire shape (see [`record`])
//! - Subscriptions deliver full snapshots on every change, never diffs
//!
//! # Backends
//!
//! - [`FirebaseCartStore`] - Firebase Realtime Database over REST + streaming
//! - [`MemoryCartStore`] - In-process store for tests, demos and offline runs

mod firebase;
mod memory;
pub mod record;

use std::collections::BTreeMap;
use std::future::Future;

use futures::stream::BoxStream;
use serde_json::Value;
use shopez_core::{ProductId, UserId};
use thiserror::Error;

pub use firebase::FirebaseCartStore;
pub use memory::MemoryCartStore;

/// A lazy, restartable stream of full cart snapshots.
pub type SnapshotStream = BoxStream<'static, Result<CartSnapshot, StoreError>>;

/// Errors that can occur when talking to a cart store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The subscription channel could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store returned a non-success status.
    #[error("store returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The store refused access to the requested path.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The credential used by a live subscription was revoked.
    #[error("auth token revoked")]
    AuthRevoked,

    /// Rate limited by the store.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// A key cannot be used as a store path segment.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored record failed validation.
    #[error(transparent)]
    Malformed(#[from] record::MalformedEntry),

    /// Failure injected by the in-memory store.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// A full point-in-time copy of every raw record in one user's cart.
///
/// Entries are unvalidated; reconciliation decides which ones are usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartSnapshot {
    entries: BTreeMap<String, Value>,
}

impl CartSnapshot {
    /// Create a snapshot from keyed raw records.
    #[must_use]
    pub const fn new(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }

    /// Build a snapshot from the JSON value stored at a cart root.
    ///
    /// `null` is an empty cart. Arrays are how Firebase renders objects whose
    /// keys are small integers, so they map back to index keys with the
    /// `null` holes skipped. Any other scalar is not a cart and is treated as
    /// empty.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        let entries = match root {
            Value::Null => BTreeMap::new(),
            Value::Object(map) => map.into_iter().collect(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            other => {
                tracing::warn!(root = %other, "cart root is not an object, treating as empty");
                BTreeMap::new()
            }
        };
        Self { entries }
    }

    /// Raw records keyed by product id.
    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Number of raw records, valid or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Storage operations for per-user carts.
///
/// # Implementation Notes
///
/// - Implementations must be thread-safe (`Send + Sync`)
/// - `subscribe` must yield an initial snapshot immediately (empty if the
///   cart does not exist), then a full snapshot after every change
/// - `put` is a full-record upsert; `delete` succeeds for absent records
pub trait CartStore: Send + Sync + 'static {
    /// Open a snapshot subscription for one user's cart.
    fn subscribe(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<SnapshotStream, StoreError>> + Send;

    /// Read one raw record.
    fn get(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Replace one record with `record`.
    fn put(
        &self,
        user: &UserId,
        product: &ProductId,
        record: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete one record. Deleting an absent record succeeds.
    fn delete(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
