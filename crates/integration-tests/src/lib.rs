//! Integration tests for ShopEZ.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopez-integration-tests
//! ```
//!
//! Every test runs the full engine (subscription task, reconciliation,
//! mutation coordinator) against the in-memory store, so no network or
//! Firebase project is needed.
//!
//! # Test Categories
//!
//! - `cart_mutations` - Merge, set-quantity, removal, exclusivity, identity
//! - `cart_sync` - Snapshots, malformed data, reconnects, cancellation
//! - `cart_view` - Aggregates and the end-to-end example scenario

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use shopez_cart::config::{BackoffConfig, SyncConfig};
use shopez_cart::identity::{IdentityProvider, SessionIdentity};
use shopez_cart::store::MemoryCartStore;
use shopez_cart::{CartEngine, CartState, EngineContext};
use shopez_core::{LineItemMetadata, ProductId, UserId};

/// How long a test waits for a state before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// A running engine over an in-memory store.
pub struct TestContext {
    pub store: Arc<MemoryCartStore>,
    pub identity: Arc<SessionIdentity>,
    pub engine: CartEngine<MemoryCartStore>,
}

impl TestContext {
    /// Engine signed in as [`user`], waiting for the first snapshot.
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryCartStore::new())).await
    }

    /// Engine over a pre-seeded store.
    pub async fn with_store(store: Arc<MemoryCartStore>) -> Self {
        let identity = Arc::new(SessionIdentity::new());
        identity.sign_in(user());

        let engine = CartEngine::start(EngineContext::new(
            Arc::clone(&store),
            Arc::clone(&identity) as Arc<dyn IdentityProvider>,
            fast_sync(),
        ))
        .unwrap();

        let ctx = Self {
            store,
            identity,
            engine,
        };
        ctx.state_where(|s| !s.is_loading()).await;
        ctx
    }

    /// Wait (bounded) for a state matching `predicate`.
    pub async fn state_where(&self, predicate: impl FnMut(&CartState) -> bool) -> CartState {
        tokio::time::timeout(WAIT, self.engine.wait_for(predicate))
            .await
            .expect("timed out waiting for cart state")
            .expect("subscription ended")
    }

    /// Wait until `product` shows `quantity`, or is absent for `None`.
    pub async fn quantity_becomes(&self, product: &str, quantity: Option<u32>) -> CartState {
        let product = ProductId::new(product);
        self.state_where(|s| {
            s.cart
                .as_ref()
                .is_some_and(|c| c.get(&product).map(|item| item.quantity) == quantity)
        })
        .await
    }
}

/// The signed-in test user.
#[must_use]
pub fn user() -> UserId {
    UserId::new("user-1")
}

/// Resubscription tuned for tests.
#[must_use]
pub fn fast_sync() -> SyncConfig {
    SyncConfig {
        backoff: BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            multiplier: 2,
        },
    }
}

/// Catalog metadata with a price in cents.
#[must_use]
pub fn product(id: &str, cents: i64) -> LineItemMetadata {
    LineItemMetadata {
        product_id: ProductId::new(id),
        title: format!("Product {id}"),
        image: format!("https://fakestoreapi.com/img/{id}.jpg"),
        category: "electronics".to_string(),
        unit_price: Decimal::new(cents, 2),
    }
}

/// A valid raw store record, as another client would have written it.
#[must_use]
pub fn raw_record(id: u64, price: f64, quantity: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Product {id}"),
        "price": price,
        "image": "https://fakestoreapi.com/img/p.jpg",
        "category": "women's clothing",
        "quantity": quantity,
        "addedAt": "2025-06-01T12:00:00.000Z",
    })
}
