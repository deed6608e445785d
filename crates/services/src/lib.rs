//! Orchestration layer for the commerce core.
//!
//! This crate wires the pure domain aggregates to the persistence boundary
//! and to external collaborators:
//! - [`CheckoutService`] drives the mutable basket
//! - [`OrderService`] turns checkouts into orders (all-or-nothing)
//! - [`PaymentService`] drives the payment ledger against the gateway
//! - [`CurrencyService`] manages currency metadata and conversion
//!
//! Collaborators (catalog, shipping rates, gateway, mailer) are consumed
//! through narrow async traits; each ships an in-memory implementation
//! with scriptable failure modes for tests.

pub mod catalog;
pub mod checkout;
pub mod currency;
pub mod error;
pub mod gateway;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod shipping;

pub use catalog::{InMemoryCatalog, ProductCatalog, ProductInfo, VariantInfo};
pub use checkout::CheckoutService;
pub use currency::CurrencyService;
pub use error::{Error, ErrorKind, Result};
pub use gateway::{
    AuthorizeOutcome, GatewayResponse, InMemoryGateway, PaymentGateway, PaymentRequest,
    ProviderStatus,
};
pub use notifications::{InMemoryMailer, Mailer, Notification, NotificationPool};
pub use orders::OrderService;
pub use payments::PaymentService;
pub use shipping::{InMemoryShippingRates, RateDefinition, ShippingQuote, ShippingRates};
