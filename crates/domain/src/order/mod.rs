//! Order aggregate and related types.

mod aggregate;
mod status;

pub use aggregate::Order;
pub use status::OrderStatus;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// A checkout with no items cannot become an order.
    #[error("checkout has no items")]
    EmptyCheckout,

    /// Shipping or billing address is missing or incomplete.
    #[error("missing or incomplete {which} address")]
    MissingAddress { which: &'static str },

    /// Customer name or email is missing.
    #[error("missing customer details (name and email are required)")]
    MissingCustomerDetails,

    /// The requested status change is not in the transition table.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}
