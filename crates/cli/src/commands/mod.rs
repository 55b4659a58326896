//! CLI command implementations.

pub mod cart;
pub mod products;

use shopez_cart::CartError;
use shopez_cart::catalog::CatalogError;
use shopez_cart::store::StoreError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// `SHOPEZ_USER_ID` is not set.
    #[error("Missing environment variable: SHOPEZ_USER_ID")]
    NoUser,

    /// The cart engine rejected or failed an operation.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// The cart store client could not be created.
    #[error("Cart store error: {0}")]
    Store(#[from] StoreError),

    /// The catalog could not be read.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The first snapshot did not arrive in time.
    #[error("Timed out waiting for the cart to load")]
    Timeout,
}
