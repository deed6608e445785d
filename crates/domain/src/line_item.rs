//! Line items shared by the checkout and order aggregates.

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A priced line in a checkout or order.
///
/// The unit price, name, SKU, and weight are snapshots captured when the
/// line was added; later catalog changes do not flow back into existing
/// baskets or orders. The identity key for merging and updates is
/// `(product_id, variant_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// The product this line refers to.
    pub product_id: ProductId,
    /// The variant, when the product has variants.
    pub variant_id: Option<VariantId>,
    /// Quantity, always greater than zero.
    pub quantity: u32,
    /// Unit price snapshot in the basket currency.
    pub unit_price: Money,
    /// Product (or variant) name snapshot.
    pub name: String,
    /// SKU snapshot.
    pub sku: String,
    /// Unit weight snapshot in grams.
    pub unit_weight: u32,
}

impl LineItem {
    /// Creates a new line item.
    pub fn new(
        product_id: impl Into<ProductId>,
        variant_id: Option<VariantId>,
        quantity: u32,
        unit_price: Money,
        name: impl Into<String>,
        sku: impl Into<String>,
        unit_weight: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id,
            quantity,
            unit_price,
            name: name.into(),
            sku: sku.into(),
            unit_weight,
        }
    }

    /// Returns true if `other` refers to the same (product, variant) key.
    pub fn same_key(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        self.product_id == *product_id && self.variant_id.as_ref() == variant_id
    }

    /// Returns the line subtotal in minor units.
    pub fn subtotal(&self) -> i64 {
        self.unit_price.minor_units() * i64::from(self.quantity)
    }

    /// Returns the line weight in grams.
    pub fn weight(&self) -> u64 {
        u64::from(self.unit_weight) * u64::from(self.quantity)
    }
}
