//! Domain layer for the checkout-to-order financial lifecycle.
//!
//! This crate provides the pure domain model:
//! - Money and currency metadata with minor-unit conversion
//! - Discount definitions and the evaluation engine
//! - The mutable Checkout aggregate and its status machine
//! - The frozen-item Order aggregate and its closed status machine
//! - Payment transactions and the append-only ledger view
//!
//! Everything here is synchronous and I/O-free; persistence and
//! collaborator calls live in the `store` and `services` crates.

pub mod address;
pub mod checkout;
pub mod currency;
pub mod discount;
pub mod line_item;
pub mod money;
pub mod order;
pub mod payment;

pub use address::{Address, CustomerDetails};
pub use checkout::{Checkout, CheckoutError, CheckoutOwner, CheckoutStatus};
pub use currency::{Currency, CurrencyError, convert};
pub use discount::{
    AppliedDiscount, BasketLine, Discount, DiscountBasket, DiscountError, DiscountKind,
    DiscountMethod,
};
pub use line_item::LineItem;
pub use money::{CurrencyCode, Money, MoneyError};
pub use order::{Order, OrderError, OrderStatus};
pub use payment::{Ledger, PaymentError, PaymentTransaction, TransactionKind, TransactionStatus};
