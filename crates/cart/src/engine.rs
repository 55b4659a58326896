//! Cart engine facade.
//!
//! One [`CartEngine`] serves one authenticated session. It owns the live
//! subscription and the mutation coordinator for that session's user, built
//! from an explicit [`EngineContext`].

use std::sync::Arc;

use futures::Stream;
use shopez_core::{CartLineItem, LineItemMetadata, PendingOperation, ProductId, UserId};
use tokio::sync::watch;
use tracing::info;

use crate::config::SyncConfig;
use crate::coordinator::{MutationCoordinator, PendingTable};
use crate::error::{CartError, Result};
use crate::identity::IdentityProvider;
use crate::repository::CartRepository;
use crate::store::CartStore;
use crate::sync::{CartState, CartSubscription, Reconciler};
use crate::view::CartView;

/// Everything an engine needs, passed in at construction.
pub struct EngineContext<S> {
    pub store: Arc<S>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sync: SyncConfig,
}

impl<S> EngineContext<S> {
    #[must_use]
    pub fn new(store: Arc<S>, identity: Arc<dyn IdentityProvider>, sync: SyncConfig) -> Self {
        Self {
            store,
            identity,
            sync,
        }
    }
}

/// The cart of one signed-in user.
pub struct CartEngine<S: CartStore> {
    user: UserId,
    coordinator: MutationCoordinator<S>,
    subscription: CartSubscription,
}

impl<S: CartStore> CartEngine<S> {
    /// Start an engine for the currently signed-in user.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unauthenticated` if nobody is signed in.
    pub fn start(context: EngineContext<S>) -> Result<Self> {
        let user = context
            .identity
            .current_user()
            .ok_or(CartError::Unauthenticated)?;

        let repo = CartRepository::new(context.store);
        let subscription = Reconciler::spawn(repo.clone(), user.clone(), context.sync.backoff);
        let coordinator =
            MutationCoordinator::new(repo, context.identity, user.clone(), subscription.subscribe());

        info!(user = %user, "cart engine started");
        Ok(Self {
            user,
            coordinator,
            subscription,
        })
    }

    /// User this engine is scoped to.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// See [`MutationCoordinator::add`].
    ///
    /// # Errors
    ///
    /// See [`MutationCoordinator::add`].
    pub async fn add(&self, metadata: LineItemMetadata, quantity: u32) -> Result<CartLineItem> {
        self.coordinator.add(metadata, quantity).await
    }

    /// See [`MutationCoordinator::set_quantity`].
    ///
    /// # Errors
    ///
    /// See [`MutationCoordinator::set_quantity`].
    pub async fn set_quantity(
        &self,
        product: &ProductId,
        quantity: i64,
    ) -> Result<Option<CartLineItem>> {
        self.coordinator.set_quantity(product, quantity).await
    }

    /// See [`MutationCoordinator::remove`].
    ///
    /// # Errors
    ///
    /// See [`MutationCoordinator::remove`].
    pub async fn remove(&self, product: &ProductId) -> Result<()> {
        self.coordinator.remove(product).await
    }

    /// Latest published cart state.
    #[must_use]
    pub fn state(&self) -> CartState {
        self.subscription.current()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.subscription.subscribe()
    }

    /// Stream of cart states, starting with the current one.
    pub fn updates(&self) -> impl Stream<Item = CartState> + Send + 'static {
        self.subscription.updates()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&CartState) -> bool) -> Option<CartState> {
        self.subscription.wait_for(predicate).await
    }

    /// Current view model.
    #[must_use]
    pub fn view(&self) -> CartView {
        let state = self.subscription.current();
        CartView::derive(state.cart.as_ref(), &self.coordinator.pending_table())
    }

    #[must_use]
    pub fn pending(&self, product: &ProductId) -> Option<PendingOperation> {
        self.coordinator.pending(product)
    }

    #[must_use]
    pub fn subscribe_pending(&self) -> watch::Receiver<PendingTable> {
        self.coordinator.subscribe_pending()
    }

    /// Restart the store subscription (pull-to-refresh).
    pub fn resubscribe(&self) {
        self.subscription.resubscribe();
    }

    /// Cancel the subscription. In-flight mutations still run to completion.
    pub async fn shutdown(self) {
        info!(user = %self.user, "cart engine shutting down");
        self.subscription.cancel().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::identity::{SessionIdentity, StaticIdentity};
    use crate::store::MemoryCartStore;

    fn context(identity: Arc<dyn IdentityProvider>) -> EngineContext<MemoryCartStore> {
        EngineContext::new(
            Arc::new(MemoryCartStore::new()),
            identity,
            SyncConfig::default(),
        )
    }

    fn metadata() -> LineItemMetadata {
        LineItemMetadata {
            product_id: ProductId::new("A"),
            title: "Solid Gold Petite Micropave".to_string(),
            image: "https://img.example/r.jpg".to_string(),
            category: "jewelery".to_string(),
            unit_price: Decimal::new(999, 2),
        }
    }

    #[tokio::test]
    async fn test_start_requires_identity() {
        let result = CartEngine::start(context(Arc::new(StaticIdentity::anonymous())));
        assert!(matches!(result, Err(CartError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_view_follows_mutations() {
        let engine =
            CartEngine::start(context(Arc::new(StaticIdentity::signed_in(UserId::new("u1")))))
                .unwrap();
        engine.wait_for(|s| !s.is_loading()).await.unwrap();
        assert!(engine.view().is_empty());

        engine.add(metadata(), 2).await.unwrap();
        engine
            .wait_for(|s| s.cart.as_ref().is_some_and(|c| c.item_count() == 2))
            .await
            .unwrap();

        let totals = engine.view().totals();
        assert_eq!(totals.total_price, Decimal::new(1998, 2));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_sign_out_rejects_mutations() {
        let identity = Arc::new(SessionIdentity::new());
        identity.sign_in(UserId::new("u1"));
        let engine = CartEngine::start(context(identity.clone())).unwrap();

        identity.sign_out();
        assert!(matches!(
            engine.add(metadata(), 1).await,
            Err(CartError::Unauthenticated)
        ));

        identity.sign_in(UserId::new("u2"));
        assert!(matches!(
            engine.remove(&ProductId::new("A")).await,
            Err(CartError::Unauthenticated)
        ));
    }
}
