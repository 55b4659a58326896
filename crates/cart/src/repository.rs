//! Typed access to one store.
//!
//! The repository is the only place that turns line items into wire records
//! and back. Writes always carry the complete record.

use std::sync::Arc;

use shopez_core::{CartLineItem, ProductId, UserId};
use tracing::{debug, instrument};

use crate::error::{CartError, Result};
use crate::store::{CartStore, SnapshotStream, StoreError, record};

/// Cart repository over a [`CartStore`].
pub struct CartRepository<S> {
    store: Arc<S>,
}

impl<S> Clone for CartRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CartStore> CartRepository<S> {
    /// Create a repository over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Open a snapshot subscription for `user`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the channel cannot be established; callers are
    /// expected to retry with backoff.
    pub async fn subscribe(&self, user: &UserId) -> std::result::Result<SnapshotStream, StoreError> {
        self.store.subscribe(user).await
    }

    /// Point lookup of one line item.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Read` if the store fails or the stored record is
    /// malformed.
    #[instrument(skip_all, fields(user = %user, product = %product))]
    pub async fn read_item(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<Option<CartLineItem>> {
        let Some(raw) = self.store.get(user, product).await.map_err(CartError::Read)? else {
            return Ok(None);
        };

        let item = record::decode(product.as_str(), &raw)
            .map_err(|e| CartError::Read(StoreError::Malformed(e)))?;
        Ok(Some(item))
    }

    /// Upsert the complete record for `item`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Write` if encoding or the store write fails.
    #[instrument(skip_all, fields(user = %user, product = %item.product_id, quantity = item.quantity))]
    pub async fn write_item(&self, user: &UserId, item: &CartLineItem) -> Result<()> {
        let raw = record::encode(item).map_err(|e| CartError::Write(StoreError::Parse(e)))?;
        self.store
            .put(user, &item.product_id, raw)
            .await
            .map_err(CartError::Write)?;
        debug!("line item written");
        Ok(())
    }

    /// Delete one line item. Absent items succeed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Write` if the store delete fails.
    #[instrument(skip_all, fields(user = %user, product = %product))]
    pub async fn delete_item(&self, user: &UserId, product: &ProductId) -> Result<()> {
        self.store
            .delete(user, product)
            .await
            .map_err(CartError::Write)?;
        debug!("line item deleted");
        Ok(())
    }
}
