//! Persistence boundary for the commerce core.
//!
//! Defines async repository traits for checkouts, orders, payment
//! transactions, discounts, and currencies, plus in-memory implementations
//! used by tests and as reference semantics for real backends.
//!
//! Checkout and order writes use optimistic concurrency: every update
//! carries the version the caller loaded, and a stale write fails with
//! [`StoreError::ConcurrencyConflict`]. Discount usage accounting and
//! default-currency switching are conditional atomic updates inside a
//! single store call, because callers cannot make them atomic from
//! outside.

mod error;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use memory::{
    InMemoryCheckoutStore, InMemoryCurrencyStore, InMemoryDiscountStore, InMemoryOrderStore,
    InMemoryTransactionStore,
};
pub use traits::{CheckoutStore, CurrencyStore, DiscountStore, OrderStore, TransactionStore};
