//! Shared identifier types for the commerce core.
//!
//! Identifiers minted by this system wrap a UUID; identifiers owned by an
//! external system (catalog, sessions, shipping) wrap a string.

mod types;

pub use types::{
    CategoryId, CheckoutId, DiscountId, OrderId, ProductId, SessionId, ShippingMethodId,
    TransactionId, UserId, VariantId,
};
