//! Product catalog and stock collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CategoryId, ProductId, VariantId};
use domain::Money;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// A product variant as reported by the catalog.
#[derive(Debug, Clone)]
pub struct VariantInfo {
    /// Variant identifier.
    pub id: VariantId,
    /// Variant display name.
    pub name: String,
    /// Variant SKU.
    pub sku: String,
    /// Unit price in the default currency.
    pub price: Money,
    /// Unit weight in grams.
    pub weight: u32,
    /// Units on hand.
    pub stock: u32,
}

/// A product as reported by the catalog.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    /// Product identifier.
    pub id: ProductId,
    /// Product display name.
    pub name: String,
    /// Product SKU.
    pub sku: String,
    /// Unit price in the default currency.
    pub price: Money,
    /// Unit weight in grams.
    pub weight: u32,
    /// Units on hand (ignored when the product has variants).
    pub stock: u32,
    /// False removes the product from sale without deleting it.
    pub active: bool,
    /// Categories the product belongs to.
    pub categories: Vec<CategoryId>,
    /// Variants, when the product has any.
    pub variants: Vec<VariantInfo>,
}

impl ProductInfo {
    /// Looks up a variant by id.
    pub fn variant(&self, id: &VariantId) -> Option<&VariantInfo> {
        self.variants.iter().find(|v| v.id == *id)
    }
}

/// Collaborator contract for product lookup and stock accounting.
///
/// Stock adjustment must be conditional at the collaborator boundary:
/// a decrement only succeeds when enough units are on hand, atomically.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Loads a product by id.
    async fn product(&self, id: &ProductId) -> Result<ProductInfo>;

    /// Returns true if the requested quantity can currently be fulfilled.
    async fn is_available(
        &self,
        id: &ProductId,
        variant: Option<&VariantId>,
        quantity: u32,
    ) -> Result<bool>;

    /// Adjusts stock by `delta` (negative decrements).
    ///
    /// A decrement below zero fails with `InsufficientStock` and leaves the
    /// count unchanged.
    async fn adjust_stock(
        &self,
        id: &ProductId,
        variant: Option<&VariantId>,
        delta: i64,
    ) -> Result<()>;

    /// Returns the categories a product belongs to.
    async fn categories_for(&self, id: &ProductId) -> Result<Vec<CategoryId>>;
}

/// In-memory catalog for testing.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductInfo>>>,
}

impl InMemoryCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn put(&self, product: ProductInfo) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    /// Returns the current stock count for assertions.
    pub async fn stock_of(&self, id: &ProductId, variant: Option<&VariantId>) -> Option<u32> {
        let products = self.products.read().await;
        let product = products.get(id)?;
        match variant {
            Some(v) => product.variant(v).map(|v| v.stock),
            None => Some(product.stock),
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn product(&self, id: &ProductId) -> Result<ProductInfo> {
        self.products
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ProductNotFound(id.clone()))
    }

    async fn is_available(
        &self,
        id: &ProductId,
        variant: Option<&VariantId>,
        quantity: u32,
    ) -> Result<bool> {
        let products = self.products.read().await;
        let product = products
            .get(id)
            .ok_or_else(|| Error::ProductNotFound(id.clone()))?;
        if !product.active {
            return Ok(false);
        }
        let stock = match variant {
            Some(v) => {
                product
                    .variant(v)
                    .ok_or_else(|| Error::VariantNotFound {
                        product_id: id.clone(),
                        variant_id: v.clone(),
                    })?
                    .stock
            }
            None => product.stock,
        };
        Ok(stock >= quantity)
    }

    async fn adjust_stock(
        &self,
        id: &ProductId,
        variant: Option<&VariantId>,
        delta: i64,
    ) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(id)
            .ok_or_else(|| Error::ProductNotFound(id.clone()))?;
        let stock = match variant {
            Some(v) => {
                let variant_id = v.clone();
                &mut product
                    .variants
                    .iter_mut()
                    .find(|var| var.id == variant_id)
                    .ok_or_else(|| Error::VariantNotFound {
                        product_id: id.clone(),
                        variant_id,
                    })?
                    .stock
            }
            None => &mut product.stock,
        };

        let next = i64::from(*stock) + delta;
        if next < 0 {
            return Err(Error::InsufficientStock {
                product_id: id.clone(),
                requested: delta.unsigned_abs() as u32,
            });
        }
        *stock = next as u32;
        Ok(())
    }

    async fn categories_for(&self, id: &ProductId) -> Result<Vec<CategoryId>> {
        Ok(self
            .products
            .read()
            .await
            .get(id)
            .map(|p| p.categories.clone())
            .unwrap_or_default())
    }
}
