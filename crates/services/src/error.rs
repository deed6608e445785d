//! Service error types and the caller-facing error taxonomy.

use common::{OrderId, ProductId, ShippingMethodId, TransactionId, VariantId};
use domain::{
    CheckoutError, CurrencyCode, CurrencyError, DiscountError, MoneyError, OrderError,
    OrderStatus, PaymentError,
};
use store::StoreError;
use thiserror::Error;

/// Coarse classification of a service error.
///
/// Callers receive a single error classified by kind; none of these are
/// retried automatically by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// Ownership mismatch.
    Unauthorized,
    /// A status-machine or payment-state violation.
    InvalidState,
    /// Bad input: amounts, quantities, missing fields.
    InvalidInput,
    /// The catalog cannot satisfy the requested quantity.
    InsufficientStock,
    /// A concurrent write won; the caller may retry.
    Conflict,
    /// A collaborator call failed; the message carries its error.
    ExternalFailure,
}

/// Errors surfaced by the service layer.
#[derive(Debug, Error)]
pub enum Error {
    /// No Active checkout exists for the owner.
    #[error("no active checkout for {owner}")]
    CheckoutNotFound { owner: String },

    /// The order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// The payment transaction does not exist.
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// No Pending authorization to confirm on the order.
    #[error("order {0} has no pending authorization")]
    NoPendingAuthorization(OrderId),

    /// The discount code does not exist.
    #[error("discount code not found: {0}")]
    DiscountNotFound(String),

    /// The currency is not configured.
    #[error("currency not found: {0}")]
    CurrencyNotFound(CurrencyCode),

    /// The currency exists but is disabled.
    #[error("currency {0} is disabled")]
    CurrencyDisabled(CurrencyCode),

    /// No default currency has been configured yet.
    #[error("no default currency is configured")]
    NoDefaultCurrency,

    /// The product does not exist in the catalog.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The variant does not exist on the product.
    #[error("variant not found: product {product_id}, variant {variant_id}")]
    VariantNotFound {
        product_id: ProductId,
        variant_id: VariantId,
    },

    /// The product exists but is not for sale.
    #[error("product {0} is not available for sale")]
    ProductInactive(ProductId),

    /// The catalog cannot satisfy the requested quantity.
    #[error("insufficient stock for product {product_id} (requested {requested})")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// The caller does not own the order.
    #[error("order {0} belongs to a different user")]
    Unauthorized(OrderId),

    /// A shipping quote needs a shipping address on the checkout.
    #[error("a shipping address is required before selecting a shipping method")]
    ShippingAddressRequired,

    /// The shipping method is unknown or does not serve the address.
    #[error("shipping method {0} is not available")]
    ShippingMethodUnavailable(ShippingMethodId),

    /// The order has already been paid.
    #[error("order {0} is already paid")]
    AlreadyPaid(OrderId),

    /// Capture requires a Paid order.
    #[error("capture not allowed while order is {status}")]
    CaptureNotAllowed { status: OrderStatus },

    /// Cancel requires a PendingAction order.
    #[error("cancel not allowed while order is {status}")]
    CancelNotAllowed { status: OrderStatus },

    /// Refund requires a Paid or Captured order.
    #[error("refund not allowed while order is {status}")]
    RefundNotAllowed { status: OrderStatus },

    /// The payment provider is not enabled.
    #[error("payment provider {0} is not available")]
    ProviderUnavailable(String),

    /// The gateway processed the call and declined it.
    #[error("gateway rejected the payment: {0}")]
    GatewayRejected(String),

    /// The gateway call itself failed (transport error, timeout).
    /// Treated as a failure outcome for ledger purposes.
    #[error("gateway call failed: {0}")]
    GatewayFailure(String),

    /// Checkout aggregate error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Order aggregate error.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Ledger amount-check error.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Discount evaluation error.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// Money arithmetic error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Currency conversion error.
    #[error(transparent)]
    Currency(#[from] CurrencyError),

    /// Persistence error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CheckoutNotFound { .. }
            | Error::OrderNotFound(_)
            | Error::TransactionNotFound(_)
            | Error::NoPendingAuthorization(_)
            | Error::DiscountNotFound(_)
            | Error::CurrencyNotFound(_)
            | Error::NoDefaultCurrency
            | Error::ProductNotFound(_)
            | Error::VariantNotFound { .. }
            | Error::ShippingMethodUnavailable(_) => ErrorKind::NotFound,

            Error::Unauthorized(_) => ErrorKind::Unauthorized,

            Error::AlreadyPaid(_)
            | Error::CaptureNotAllowed { .. }
            | Error::CancelNotAllowed { .. }
            | Error::RefundNotAllowed { .. }
            | Error::ProviderUnavailable(_)
            | Error::CurrencyDisabled(_)
            | Error::ProductInactive(_) => ErrorKind::InvalidState,

            Error::InsufficientStock { .. } => ErrorKind::InsufficientStock,

            Error::ShippingAddressRequired
            | Error::Discount(_)
            | Error::Money(_)
            | Error::Currency(_) => ErrorKind::InvalidInput,

            Error::GatewayRejected(_) | Error::GatewayFailure(_) => ErrorKind::ExternalFailure,

            Error::Checkout(e) => match e {
                CheckoutError::InvalidStatusTransition { .. } => ErrorKind::InvalidState,
                CheckoutError::ItemNotFound { .. } => ErrorKind::NotFound,
                CheckoutError::InvalidQuantity { .. } | CheckoutError::CurrencyMismatch { .. } => {
                    ErrorKind::InvalidInput
                }
            },

            Error::Order(e) => match e {
                OrderError::InvalidStatusTransition { .. } => ErrorKind::InvalidState,
                OrderError::EmptyCheckout
                | OrderError::MissingAddress { .. }
                | OrderError::MissingCustomerDetails => ErrorKind::InvalidInput,
            },

            Error::Payment(e) => match e {
                PaymentError::InvalidAmount { .. } => ErrorKind::InvalidInput,
                PaymentError::RefundExceedsAvailable { .. } => ErrorKind::InvalidState,
            },

            Error::Store(e) => match e {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::AlreadyExists { .. } | StoreError::ConcurrencyConflict { .. } => {
                    ErrorKind::Conflict
                }
                StoreError::DefaultCurrencyProtected { .. } => ErrorKind::InvalidState,
            },
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, Error>;
