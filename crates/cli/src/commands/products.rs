//! Catalog commands.

use shopez_cart::CartSyncConfig;
use shopez_cart::catalog::CatalogClient;
use shopez_core::Price;

use super::CommandError;

/// Print every catalog product.
pub async fn list(config: &CartSyncConfig) -> Result<(), CommandError> {
    let catalog = CatalogClient::new(&config.catalog);

    tracing::info!("Fetching products from {}", config.catalog.base_url);
    let products = catalog.products().await?;

    for product in products.iter() {
        let rating = product
            .rating
            .map_or_else(|| "N/A".to_string(), |r| format!("{:.1} ({})", r.rate, r.count));
        tracing::info!(
            "{:>4}  {:<10}  {:<6}  {}",
            product.id,
            Price::new(product.price, config.currency).display(),
            rating,
            product.title
        );
    }
    tracing::info!("{} products", products.len());
    Ok(())
}
