//! Repository traits.

use async_trait::async_trait;
use common::{CheckoutId, DiscountId, OrderId, TransactionId, UserId};
use domain::{
    Checkout, CheckoutOwner, Currency, CurrencyCode, Discount, Order, PaymentTransaction,
    TransactionStatus,
};

use crate::error::Result;

/// Persistence for the checkout aggregate.
///
/// Implementations must guarantee at most one Active checkout per owner
/// key: `insert` fails with `AlreadyExists` when the owner already has one.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Loads a checkout by id.
    async fn get(&self, id: CheckoutId) -> Result<Option<Checkout>>;

    /// Finds the owner's Active checkout, if any.
    async fn find_active_by_owner(&self, owner: &CheckoutOwner) -> Result<Option<Checkout>>;

    /// Inserts a new checkout.
    async fn insert(&self, checkout: &Checkout) -> Result<()>;

    /// Writes back a mutated checkout.
    ///
    /// The checkout's version must match the stored version; on success the
    /// stored version is bumped and written into `checkout`.
    async fn update(&self, checkout: &mut Checkout) -> Result<()>;

    /// Deletes a checkout.
    async fn delete(&self, id: CheckoutId) -> Result<()>;
}

/// Persistence for the order aggregate.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, most recent first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Inserts a new order.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Writes back a mutated order with a version check, as
    /// [`CheckoutStore::update`].
    async fn update(&self, order: &mut Order) -> Result<()>;
}

/// Append-only persistence for payment transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Appends a transaction to its order's ledger.
    async fn append(&self, transaction: &PaymentTransaction) -> Result<()>;

    /// Loads a transaction by id.
    async fn get(&self, id: TransactionId) -> Result<Option<PaymentTransaction>>;

    /// Returns an order's transactions in append order.
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentTransaction>>;

    /// Updates the status of an existing transaction and merges extra
    /// metadata. Kind and amount are immutable by construction.
    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        metadata: Vec<(String, String)>,
    ) -> Result<()>;
}

/// Persistence for discount definitions and their usage accounting.
#[async_trait]
pub trait DiscountStore: Send + Sync {
    /// Loads a discount by id.
    async fn get(&self, id: DiscountId) -> Result<Option<Discount>>;

    /// Loads a discount by redemption code.
    async fn get_by_code(&self, code: &str) -> Result<Option<Discount>>;

    /// Inserts or replaces a discount definition.
    async fn upsert(&self, discount: &Discount) -> Result<()>;

    /// Consumes one usage slot if the limit allows it.
    ///
    /// Returns false when the usage limit is exhausted. The check and the
    /// increment happen atomically.
    async fn increment_usage(&self, id: DiscountId) -> Result<bool>;

    /// Returns a previously consumed usage slot (used when a multi-step
    /// operation rolls back).
    async fn release_usage(&self, id: DiscountId) -> Result<()>;
}

/// Persistence for currency metadata.
#[async_trait]
pub trait CurrencyStore: Send + Sync {
    /// Loads a currency by code.
    async fn get(&self, code: &CurrencyCode) -> Result<Option<Currency>>;

    /// Returns the default currency, if one is configured.
    async fn get_default(&self) -> Result<Option<Currency>>;

    /// Lists all currencies.
    async fn list(&self) -> Result<Vec<Currency>>;

    /// Inserts or replaces a currency.
    ///
    /// The default flag is managed exclusively through [`set_default`];
    /// upsert preserves the stored flag for existing codes and clears it
    /// for new ones.
    ///
    /// [`set_default`]: CurrencyStore::set_default
    async fn upsert(&self, currency: &Currency) -> Result<()>;

    /// Makes the given currency the default in a single atomic update:
    /// the previous default is cleared and the new default's exchange rate
    /// is pinned to 1.
    async fn set_default(&self, code: &CurrencyCode) -> Result<()>;

    /// Deletes a currency. The default currency is protected.
    async fn delete(&self, code: &CurrencyCode) -> Result<()>;
}
