//! Mutation coordinator.
//!
//! The coordinator is the only component that writes to the store. Every
//! mutation marks its line item pending before the first store call and
//! clears the mark when it settles, whichever way it settles. A second
//! mutation on a busy line item is rejected with [`CartError::Conflict`]
//! instead of being queued.
//!
//! # Known limitation
//!
//! Add is a read-then-write merge. Two coordinators adding the same product
//! at the same time (two devices signed in as the same user) can both read
//! the old quantity, and one increment is lost. The store offers no atomic
//! increment for these records.
//!
//! Set quantity rewrites the whole record from the locally reconciled line.
//! If another device has deleted the line and that deletion has not reached
//! this client yet, the write brings the line back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use shopez_core::{CartLineItem, LineItemMetadata, PendingOperation, ProductId, UserId};
use tokio::sync::watch;
use tracing::{Instrument, Span, debug, instrument};
use uuid::Uuid;

use crate::error::{CartError, Result};
use crate::identity::IdentityProvider;
use crate::repository::CartRepository;
use crate::store::CartStore;
use crate::sync::CartState;

/// In-flight mutations keyed by product.
pub type PendingTable = HashMap<ProductId, PendingOperation>;

/// Serializes cart mutations per line item.
pub struct MutationCoordinator<S> {
    repo: CartRepository<S>,
    identity: Arc<dyn IdentityProvider>,
    user: UserId,
    cart: watch::Receiver<CartState>,
    pending: Arc<watch::Sender<PendingTable>>,
}

impl<S> Clone for MutationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            identity: Arc::clone(&self.identity),
            user: self.user.clone(),
            cart: self.cart.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Clears a pending mark when dropped.
struct PendingGuard {
    table: Arc<watch::Sender<PendingTable>>,
    product: ProductId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.send_modify(|table| {
            table.remove(&self.product);
        });
    }
}

impl<S: CartStore> MutationCoordinator<S> {
    /// Create a coordinator acting for `user`.
    ///
    /// `cart` is the reconciled state used by quantity updates.
    #[must_use]
    pub fn new(
        repo: CartRepository<S>,
        identity: Arc<dyn IdentityProvider>,
        user: UserId,
        cart: watch::Receiver<CartState>,
    ) -> Self {
        Self {
            repo,
            identity,
            user,
            cart,
            pending: Arc::new(watch::channel(PendingTable::new()).0),
        }
    }

    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// A new line is stamped with the current time; an existing line keeps
    /// its `added_at` and the catalog data it was first added with.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the session no longer belongs to this user
    /// - `InvalidQuantity` for zero or a merge that would overflow
    /// - `Conflict` if another mutation on this product is in flight
    /// - `Read` / `Write` if the store fails
    #[instrument(
        skip_all,
        fields(product = %metadata.product_id, quantity = quantity, mutation_id = %Uuid::new_v4())
    )]
    pub async fn add(&self, metadata: LineItemMetadata, quantity: u32) -> Result<CartLineItem> {
        let user = self.authorize()?;
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(0));
        }

        let guard = self.begin(&metadata.product_id, PendingOperation::Adding)?;
        let repo = self.repo.clone();

        drive(async move {
            let _guard = guard;
            let item = match repo.read_item(&user, &metadata.product_id).await? {
                Some(existing) => {
                    let merged = existing.quantity.checked_add(quantity).ok_or_else(|| {
                        CartError::InvalidQuantity(
                            i64::from(existing.quantity) + i64::from(quantity),
                        )
                    })?;
                    debug!(from = existing.quantity, to = merged, "merging into existing line");
                    existing.with_quantity(merged)
                }
                None => metadata.into_line_item(quantity, Utc::now()),
            };

            repo.write_item(&user, &item).await?;
            Ok(item)
        })
        .await
    }

    /// Overwrite the quantity of a line item. Zero or less removes it.
    ///
    /// The record is rebuilt from the locally reconciled line, so the
    /// product must already be visible in the cart.
    ///
    /// Returns the written line, or `None` if the line was removed.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the session no longer belongs to this user
    /// - `InvalidQuantity` if the quantity does not fit a line item
    /// - `Conflict` if another mutation on this product is in flight
    /// - `NotInCart` if the product is not in the reconciled cart
    /// - `Write` if the store fails
    #[instrument(
        skip_all,
        fields(product = %product, quantity = quantity, mutation_id = %Uuid::new_v4())
    )]
    pub async fn set_quantity(
        &self,
        product: &ProductId,
        quantity: i64,
    ) -> Result<Option<CartLineItem>> {
        let user = self.authorize()?;
        if quantity <= 0 {
            debug!("non-positive quantity, removing");
            self.delete(user, product).await?;
            return Ok(None);
        }

        let target = u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity(quantity))?;
        let guard = self.begin(product, PendingOperation::Updating { target })?;

        let current = self
            .cart
            .borrow()
            .cart
            .as_ref()
            .and_then(|cart| cart.get(product).cloned());
        let Some(current) = current else {
            return Err(CartError::NotInCart(product.clone()));
        };

        let repo = self.repo.clone();
        drive(async move {
            let _guard = guard;
            let item = current.with_quantity(target);
            repo.write_item(&user, &item).await?;
            Ok(Some(item))
        })
        .await
    }

    /// Remove a line item. Removing an absent item succeeds.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the session no longer belongs to this user
    /// - `Conflict` if another mutation on this product is in flight
    /// - `Write` if the store fails
    #[instrument(skip_all, fields(product = %product, mutation_id = %Uuid::new_v4()))]
    pub async fn remove(&self, product: &ProductId) -> Result<()> {
        let user = self.authorize()?;
        self.delete(user, product).await
    }

    /// The operation in flight for `product`, if any.
    #[must_use]
    pub fn pending(&self, product: &ProductId) -> Option<PendingOperation> {
        self.pending.borrow().get(product).copied()
    }

    /// Snapshot of every in-flight operation.
    #[must_use]
    pub fn pending_table(&self) -> PendingTable {
        self.pending.borrow().clone()
    }

    /// Receiver notified whenever a line item becomes busy or idle.
    #[must_use]
    pub fn subscribe_pending(&self) -> watch::Receiver<PendingTable> {
        self.pending.subscribe()
    }

    async fn delete(&self, user: UserId, product: &ProductId) -> Result<()> {
        let guard = self.begin(product, PendingOperation::Removing)?;
        let repo = self.repo.clone();
        let product = product.clone();

        drive(async move {
            let _guard = guard;
            repo.delete_item(&user, &product).await
        })
        .await
    }

    /// The session user, if it is still the user this coordinator acts for.
    fn authorize(&self) -> Result<UserId> {
        match self.identity.current_user() {
            Some(current) if current == self.user => Ok(current),
            _ => Err(CartError::Unauthenticated),
        }
    }

    /// Mark `product` pending, or report the operation already in flight.
    fn begin(&self, product: &ProductId, operation: PendingOperation) -> Result<PendingGuard> {
        let mut in_flight = None;
        self.pending.send_if_modified(|table| {
            if let Some(existing) = table.get(product) {
                in_flight = Some(*existing);
                false
            } else {
                table.insert(product.clone(), operation);
                true
            }
        });

        if let Some(pending) = in_flight {
            debug!(%pending, "rejecting concurrent mutation");
            return Err(CartError::Conflict {
                product_id: product.clone(),
                pending,
            });
        }

        Ok(PendingGuard {
            table: Arc::clone(&self.pending),
            product: product.clone(),
        })
    }
}

/// Run a mutation on its own task so it settles even if the caller goes away.
async fn drive<T, F>(mutation: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(mutation.instrument(Span::current()))
        .await
        .map_err(|e| CartError::Interrupted(e.to_string()))?
}
