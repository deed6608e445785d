//! In-memory store implementations for testing.
//!
//! These provide the same contracts as a real backend would: optimistic
//! version checks on checkout/order writes, and atomic conditional updates
//! for discount usage and the default-currency switch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CheckoutId, DiscountId, OrderId, TransactionId, UserId};
use domain::{
    Checkout, CheckoutOwner, CheckoutStatus, Currency, CurrencyCode, Discount, Order,
    PaymentTransaction, TransactionStatus,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::traits::{CheckoutStore, CurrencyStore, DiscountStore, OrderStore, TransactionStore};

/// In-memory checkout store.
#[derive(Clone, Default)]
pub struct InMemoryCheckoutStore {
    checkouts: Arc<RwLock<HashMap<CheckoutId, Checkout>>>,
}

impl InMemoryCheckoutStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored checkouts.
    pub async fn count(&self) -> usize {
        self.checkouts.read().await.len()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    async fn get(&self, id: CheckoutId) -> Result<Option<Checkout>> {
        Ok(self.checkouts.read().await.get(&id).cloned())
    }

    async fn find_active_by_owner(&self, owner: &CheckoutOwner) -> Result<Option<Checkout>> {
        Ok(self
            .checkouts
            .read()
            .await
            .values()
            .find(|c| c.owner() == owner && c.status() == CheckoutStatus::Active)
            .cloned())
    }

    async fn insert(&self, checkout: &Checkout) -> Result<()> {
        let mut map = self.checkouts.write().await;
        if map.contains_key(&checkout.id()) {
            return Err(StoreError::AlreadyExists {
                entity: "checkout",
                id: checkout.id().to_string(),
            });
        }
        if checkout.status() == CheckoutStatus::Active
            && map
                .values()
                .any(|c| c.owner() == checkout.owner() && c.status() == CheckoutStatus::Active)
        {
            return Err(StoreError::AlreadyExists {
                entity: "active checkout for owner",
                id: checkout.owner().to_string(),
            });
        }
        map.insert(checkout.id(), checkout.clone());
        Ok(())
    }

    async fn update(&self, checkout: &mut Checkout) -> Result<()> {
        let mut map = self.checkouts.write().await;
        let current = map
            .get(&checkout.id())
            .ok_or_else(|| StoreError::NotFound {
                entity: "checkout",
                id: checkout.id().to_string(),
            })?;
        if current.version() != checkout.version() {
            return Err(StoreError::ConcurrencyConflict {
                entity: "checkout",
                id: checkout.id().to_string(),
                expected: checkout.version(),
                actual: current.version(),
            });
        }
        checkout.set_version(checkout.version() + 1);
        map.insert(checkout.id(), checkout.clone());
        Ok(())
    }

    async fn delete(&self, id: CheckoutId) -> Result<()> {
        self.checkouts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                entity: "checkout",
                id: id.to_string(),
            })
    }
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id() == Some(user_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }

    async fn insert(&self, order: &Order) -> Result<()> {
        let mut map = self.orders.write().await;
        if map.contains_key(&order.id()) {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        map.insert(order.id(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &mut Order) -> Result<()> {
        let mut map = self.orders.write().await;
        let current = map.get(&order.id()).ok_or_else(|| StoreError::NotFound {
            entity: "order",
            id: order.id().to_string(),
        })?;
        if current.version() != order.version() {
            return Err(StoreError::ConcurrencyConflict {
                entity: "order",
                id: order.id().to_string(),
                expected: order.version(),
                actual: current.version(),
            });
        }
        order.set_version(order.version() + 1);
        map.insert(order.id(), order.clone());
        Ok(())
    }
}

/// In-memory payment transaction store.
///
/// Transactions are kept in a single append-ordered list, mirroring how a
/// real backend would order them by insertion sequence.
#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<Vec<PaymentTransaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of transactions across all orders.
    pub async fn count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn append(&self, transaction: &PaymentTransaction) -> Result<()> {
        let mut list = self.transactions.write().await;
        if list.iter().any(|t| t.id() == transaction.id()) {
            return Err(StoreError::AlreadyExists {
                entity: "transaction",
                id: transaction.id().to_string(),
            });
        }
        list.push(transaction.clone());
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .iter()
            .find(|t| t.id() == id)
            .cloned())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentTransaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .iter()
            .filter(|t| t.order_id() == order_id)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        metadata: Vec<(String, String)>,
    ) -> Result<()> {
        let mut list = self.transactions.write().await;
        let txn = list
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "transaction",
                id: id.to_string(),
            })?;
        txn.set_status(status);
        for (key, value) in metadata {
            txn.insert_metadata(key, value);
        }
        Ok(())
    }
}

/// In-memory discount store with atomic usage accounting.
#[derive(Clone, Default)]
pub struct InMemoryDiscountStore {
    discounts: Arc<RwLock<HashMap<DiscountId, Discount>>>,
}

impl InMemoryDiscountStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscountStore for InMemoryDiscountStore {
    async fn get(&self, id: DiscountId) -> Result<Option<Discount>> {
        Ok(self.discounts.read().await.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Discount>> {
        Ok(self
            .discounts
            .read()
            .await
            .values()
            .find(|d| d.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn upsert(&self, discount: &Discount) -> Result<()> {
        self.discounts
            .write()
            .await
            .insert(discount.id, discount.clone());
        Ok(())
    }

    async fn increment_usage(&self, id: DiscountId) -> Result<bool> {
        let mut map = self.discounts.write().await;
        let discount = map.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "discount",
            id: id.to_string(),
        })?;
        if discount.usage_limit > 0 && discount.current_usage >= discount.usage_limit {
            return Ok(false);
        }
        discount.current_usage += 1;
        Ok(true)
    }

    async fn release_usage(&self, id: DiscountId) -> Result<()> {
        let mut map = self.discounts.write().await;
        let discount = map.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "discount",
            id: id.to_string(),
        })?;
        discount.current_usage = discount.current_usage.saturating_sub(1);
        Ok(())
    }
}

/// In-memory currency store.
#[derive(Clone, Default)]
pub struct InMemoryCurrencyStore {
    currencies: Arc<RwLock<HashMap<CurrencyCode, Currency>>>,
}

impl InMemoryCurrencyStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CurrencyStore for InMemoryCurrencyStore {
    async fn get(&self, code: &CurrencyCode) -> Result<Option<Currency>> {
        Ok(self.currencies.read().await.get(code).cloned())
    }

    async fn get_default(&self) -> Result<Option<Currency>> {
        Ok(self
            .currencies
            .read()
            .await
            .values()
            .find(|c| c.is_default())
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Currency>> {
        let mut list: Vec<_> = self.currencies.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.code().as_str().cmp(b.code().as_str()));
        Ok(list)
    }

    async fn upsert(&self, currency: &Currency) -> Result<()> {
        let mut map = self.currencies.write().await;
        let mut stored = currency.clone();
        // The default flag is owned by set_default; upsert cannot grant or
        // revoke it.
        let was_default = map
            .get(currency.code())
            .map(Currency::is_default)
            .unwrap_or(false);
        stored.set_default(was_default);
        map.insert(stored.code().clone(), stored);
        Ok(())
    }

    async fn set_default(&self, code: &CurrencyCode) -> Result<()> {
        let mut map = self.currencies.write().await;
        if !map.contains_key(code) {
            return Err(StoreError::NotFound {
                entity: "currency",
                id: code.to_string(),
            });
        }
        for (key, currency) in map.iter_mut() {
            currency.set_default(key == code);
        }
        Ok(())
    }

    async fn delete(&self, code: &CurrencyCode) -> Result<()> {
        let mut map = self.currencies.write().await;
        match map.get(code) {
            None => Err(StoreError::NotFound {
                entity: "currency",
                id: code.to_string(),
            }),
            Some(c) if c.is_default() => Err(StoreError::DefaultCurrencyProtected {
                code: code.to_string(),
            }),
            Some(_) => {
                map.remove(code);
                Ok(())
            }
        }
    }
}
