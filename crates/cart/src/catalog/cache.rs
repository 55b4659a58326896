//! Cache types for catalog responses.

use std::sync::Arc;

use shopez_core::ProductId;

use super::types::CatalogProduct;

/// Cache key for catalog lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products,
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<CatalogProduct>),
    Products(Arc<Vec<CatalogProduct>>),
    Categories(Arc<Vec<String>>),
}
