//! Cart commands.
//!
//! Each command starts an engine for `SHOPEZ_USER_ID` against the Firebase
//! store, does its work, and shuts the engine down.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use shopez_cart::catalog::CatalogClient;
use shopez_cart::identity::StaticIdentity;
use shopez_cart::store::FirebaseCartStore;
use shopez_cart::{CartEngine, CartState, CartSyncConfig, CartView, ConnectionStatus, EngineContext};
use shopez_core::{CurrencyCode, LineItemMetadata, ProductId};

use super::CommandError;

const LOAD_TIMEOUT: Duration = Duration::from_secs(15);

type Engine = CartEngine<FirebaseCartStore>;

fn start(config: &CartSyncConfig) -> Result<Engine, CommandError> {
    let user = config.user_id.clone().ok_or(CommandError::NoUser)?;
    let store = Arc::new(FirebaseCartStore::new(&config.firebase)?);

    Ok(CartEngine::start(EngineContext::new(
        store,
        Arc::new(StaticIdentity::signed_in(user)),
        config.sync.clone(),
    ))?)
}

/// Wait for the first reconciled snapshot.
async fn loaded(engine: &Engine) -> Result<CartState, CommandError> {
    tokio::time::timeout(LOAD_TIMEOUT, engine.wait_for(|s| !s.is_loading()))
        .await
        .ok()
        .flatten()
        .ok_or(CommandError::Timeout)
}

fn render(view: &CartView, currency: CurrencyCode) {
    match view {
        CartView::Loading => tracing::info!("Loading cart..."),
        CartView::Empty => tracing::info!("Cart is empty"),
        CartView::Items { lines, totals } => {
            for line in lines {
                let busy = line
                    .pending
                    .map_or_else(String::new, |op| format!("  [{op}]"));
                tracing::info!(
                    "{:>4}  {:>3} x {:<10}  {:>10}  {}{busy}",
                    line.item.product_id,
                    line.item.quantity,
                    line.display_unit_price(currency),
                    line.display_subtotal(currency),
                    line.item.title
                );
            }
            tracing::info!(
                "{} items, total {}",
                totals.item_count,
                totals.display_price(currency)
            );
        }
    }
}

/// Print the cart once.
pub async fn show(config: &CartSyncConfig) -> Result<(), CommandError> {
    let engine = start(config)?;
    let state = loaded(&engine).await?;

    render(&engine.view(), config.currency);
    for entry in &state.diagnostics {
        tracing::warn!("Skipped {entry}");
    }

    engine.shutdown().await;
    Ok(())
}

/// Print the cart on every change until Ctrl-C.
pub async fn watch(config: &CartSyncConfig) -> Result<(), CommandError> {
    let engine = start(config)?;
    let mut updates = std::pin::pin!(engine.updates());
    let mut last_connection = None;

    loop {
        tokio::select! {
            next = updates.next() => {
                let Some(state) = next else { break };
                if last_connection != Some(state.connection) {
                    match state.connection {
                        ConnectionStatus::Connecting => tracing::info!("Connecting..."),
                        ConnectionStatus::Live => tracing::info!("Live"),
                        ConnectionStatus::Unavailable { attempt, retry_in } => tracing::warn!(
                            "Store unavailable (attempt {attempt}), retrying in {}ms",
                            retry_in.as_millis()
                        ),
                    }
                    last_connection = Some(state.connection);
                }
                if state.connection == ConnectionStatus::Live {
                    render(&engine.view(), config.currency);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.shutdown().await;
    Ok(())
}

/// Add a catalog product.
pub async fn add(
    config: &CartSyncConfig,
    product: &ProductId,
    quantity: u32,
) -> Result<(), CommandError> {
    let catalog = CatalogClient::new(&config.catalog);
    let metadata = LineItemMetadata::from(&catalog.product(product).await?);

    let engine = start(config)?;
    let item = engine.add(metadata, quantity).await?;
    tracing::info!(
        "{} now has quantity {} ({})",
        item.title,
        item.quantity,
        shopez_core::Price::new(item.subtotal(), config.currency)
    );

    engine.shutdown().await;
    Ok(())
}

/// Overwrite a line's quantity.
pub async fn set(
    config: &CartSyncConfig,
    product: &ProductId,
    quantity: i64,
) -> Result<(), CommandError> {
    let engine = start(config)?;
    loaded(&engine).await?;

    match engine.set_quantity(product, quantity).await? {
        Some(item) => tracing::info!("{} set to quantity {}", item.title, item.quantity),
        None => tracing::info!("Removed {product}"),
    }

    engine.shutdown().await;
    Ok(())
}

/// Remove a line.
pub async fn remove(config: &CartSyncConfig, product: &ProductId) -> Result<(), CommandError> {
    let engine = start(config)?;
    engine.remove(product).await?;
    tracing::info!("Removed {product}");

    engine.shutdown().await;
    Ok(())
}
