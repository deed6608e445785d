//! Checkout aggregate and related types.

mod aggregate;
mod state;

pub use aggregate::{Checkout, CheckoutOwner};
pub use state::CheckoutStatus;

use common::{ProductId, VariantId};
use thiserror::Error;

use crate::money::CurrencyCode;

/// Errors that can occur during checkout operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    /// The checkout is no longer Active.
    #[error("invalid checkout transition: cannot {action} from {status} status")]
    InvalidStatusTransition {
        status: CheckoutStatus,
        action: &'static str,
    },

    /// Quantity must be greater than zero.
    #[error("invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// No line matches the (product, variant) key.
    #[error("item not found: product {product_id}, variant {variant_id:?}")]
    ItemNotFound {
        product_id: ProductId,
        variant_id: Option<VariantId>,
    },

    /// The item is priced in a different currency than the checkout.
    #[error("currency mismatch: item priced in {item}, checkout uses {checkout}")]
    CurrencyMismatch {
        item: CurrencyCode,
        checkout: CurrencyCode,
    },
}
