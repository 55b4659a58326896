//! Catalog product types in the Fake Store API shape.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use shopez_core::{LineItemMetadata, ProductId};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    #[serde(deserialize_with = "product_id")]
    pub id: ProductId,
    pub title: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub image: String,
    #[serde(default)]
    pub rating: Option<Rating>,
}

/// Review summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rate: f64,
    pub count: u32,
}

impl From<&CatalogProduct> for LineItemMetadata {
    fn from(product: &CatalogProduct) -> Self {
        Self {
            product_id: product.id.clone(),
            title: product.title.clone(),
            image: product.image.clone(),
            category: product.category.clone(),
            unit_price: product.price,
        }
    }
}

/// Product ids arrive as integers; the cart keys them as strings.
fn product_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ProductId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => ProductId::new(n.to_string()),
        RawId::Text(s) => ProductId::new(s),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fake_store_product() {
        let json = r#"{
            "id": 1,
            "title": "Fjallraven - Foldsack No. 1 Backpack, Fits 15 Laptops",
            "price": 109.95,
            "description": "Your perfect pack for everyday use",
            "category": "men's clothing",
            "image": "https://fakestoreapi.com/img/81fPKd-2AYL._AC_SL1500_.jpg",
            "rating": {"rate": 3.9, "count": 120}
        }"#;

        let product: CatalogProduct = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, ProductId::new("1"));
        assert_eq!(product.price, Decimal::new(10995, 2));
        assert_eq!(product.rating.unwrap().count, 120);
    }

    #[test]
    fn test_string_id_and_missing_rating() {
        let json = r#"{"id": "abc", "title": "T", "price": 1, "category": "c", "image": "i"}"#;
        let product: CatalogProduct = serde_json::from_str(json).unwrap();
        assert_eq!(product.id.as_str(), "abc");
        assert!(product.rating.is_none());
        assert!(product.description.is_empty());
    }

    #[test]
    fn test_metadata_bridge() {
        let json = r#"{"id": 7, "title": "Ring", "price": 9.99, "category": "jewelery", "image": "i"}"#;
        let product: CatalogProduct = serde_json::from_str(json).unwrap();

        let metadata = LineItemMetadata::from(&product);
        assert_eq!(metadata.product_id.as_str(), "7");
        assert_eq!(metadata.unit_price, Decimal::new(999, 2));
    }
}
