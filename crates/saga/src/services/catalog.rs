//! Product catalog lookups.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Name and price as the catalog reports them right now. Orders copy
/// these onto their lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, SagaError>;

    async fn product_exists(&self, product_id: ProductId) -> Result<bool, SagaError> {
        Ok(self.get_product(product_id).await?.is_some())
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, ProductSnapshot>,
    latency: Option<Duration>,
}

/// Catalog backed by a map, for the dev server and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, product_id: ProductId, name: impl Into<String>, price: Money) -> Self {
        self.insert(product_id, name, price);
        self
    }

    pub fn insert(&self, product_id: ProductId, name: impl Into<String>, price: Money) {
        let snapshot = ProductSnapshot {
            product_id,
            name: name.into(),
            price,
        };
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .products
            .insert(product_id, snapshot);
    }

    /// Delays every lookup, to exercise call timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .latency = latency;
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, SagaError> {
        let latency = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .products
            .get(&product_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookups_return_snapshots() {
        let catalog =
            InMemoryProductCatalog::new().with_product(ProductId::new(1), "Widget", Money::from_cents(999));

        let product = catalog.get_product(ProductId::new(1)).await.unwrap().unwrap();
        assert_eq!(product.name, "Widget");
        assert!(catalog.product_exists(ProductId::new(1)).await.unwrap());
        assert!(!catalog.product_exists(ProductId::new(2)).await.unwrap());
    }
}
