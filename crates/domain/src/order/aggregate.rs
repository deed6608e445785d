//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, ShippingMethodId, UserId};
use serde::{Deserialize, Serialize};

use crate::address::{Address, CustomerDetails};
use crate::checkout::Checkout;
use crate::discount::AppliedDiscount;
use crate::line_item::LineItem;
use crate::money::{CurrencyCode, Money};

use super::{OrderError, OrderStatus};

/// Order aggregate root.
///
/// Items, addresses, and totals are frozen from the source checkout at
/// creation; only the status and payment fields mutate afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    customer: CustomerDetails,
    items: Vec<LineItem>,
    shipping_address: Address,
    billing_address: Address,
    shipping_method: Option<ShippingMethodId>,
    shipping_cost: i64,
    applied_discount: Option<AppliedDiscount>,
    total_amount: i64,
    discount_amount: i64,
    final_amount: i64,
    total_weight: u64,
    currency: CurrencyCode,
    status: OrderStatus,
    payment_id: Option<String>,
    payment_provider: Option<String>,
    payment_method: Option<String>,
    action_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl Order {
    /// Freezes a checkout into a new Pending order.
    ///
    /// Fails when the checkout has no items, an address is missing or
    /// incomplete, or the customer details lack a name or email.
    pub fn from_checkout(id: OrderId, checkout: &Checkout) -> Result<Self, OrderError> {
        if !checkout.has_items() {
            return Err(OrderError::EmptyCheckout);
        }
        let shipping_address = checkout
            .shipping_address()
            .filter(|a| a.is_complete())
            .ok_or(OrderError::MissingAddress { which: "shipping" })?
            .clone();
        let billing_address = checkout
            .billing_address()
            .filter(|a| a.is_complete())
            .ok_or(OrderError::MissingAddress { which: "billing" })?
            .clone();
        let customer = checkout
            .customer()
            .filter(|c| c.is_complete())
            .ok_or(OrderError::MissingCustomerDetails)?
            .clone();

        let now = Utc::now();
        Ok(Self {
            id,
            user_id: checkout.owner().user_id(),
            customer,
            items: checkout.items().to_vec(),
            shipping_address,
            billing_address,
            shipping_method: checkout.shipping_method().cloned(),
            shipping_cost: checkout.shipping_cost(),
            applied_discount: checkout.applied_discount().cloned(),
            total_amount: checkout.total_amount(),
            discount_amount: checkout.discount_amount(),
            final_amount: checkout.final_amount(),
            total_weight: checkout.total_weight(),
            currency: checkout.currency().clone(),
            status: OrderStatus::Pending,
            payment_id: None,
            payment_provider: None,
            payment_method: None,
            action_url: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Returns the order id.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the owning user, or `None` for a guest order.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Returns the customer contact details.
    pub fn customer(&self) -> &CustomerDetails {
        &self.customer
    }

    /// Returns the frozen line items.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Returns the shipping address.
    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    /// Returns the billing address.
    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    /// Returns the shipping method, if one was selected.
    pub fn shipping_method(&self) -> Option<&ShippingMethodId> {
        self.shipping_method.as_ref()
    }

    /// Returns the shipping cost in minor units.
    pub fn shipping_cost(&self) -> i64 {
        self.shipping_cost
    }

    /// Returns the applied discount snapshot, if any.
    pub fn applied_discount(&self) -> Option<&AppliedDiscount> {
        self.applied_discount.as_ref()
    }

    /// Returns the pre-discount items total in minor units.
    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }

    /// Returns the discount amount in minor units.
    pub fn discount_amount(&self) -> i64 {
        self.discount_amount
    }

    /// Returns the payable amount in minor units.
    pub fn final_amount(&self) -> i64 {
        self.final_amount
    }

    /// Returns the payable amount as [`Money`].
    pub fn final_money(&self) -> Money {
        Money::new(self.final_amount, self.currency.clone())
    }

    /// Returns the total weight in grams.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the order currency.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the gateway payment id, once payment started.
    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    /// Returns the payment provider, once payment started.
    pub fn payment_provider(&self) -> Option<&str> {
        self.payment_provider.as_deref()
    }

    /// Returns the payment method, once payment succeeded.
    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }

    /// Returns the redirect URL for flows that require shopper action.
    pub fn action_url(&self) -> Option<&str> {
        self.action_url.as_deref()
    }

    /// Returns when the order was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the order was last mutated.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the version for optimistic concurrency.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sets the version; called by the store after a successful write.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// The single status mutator.
    ///
    /// Validates the transition against the closed table before mutating.
    pub fn update_status(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the gateway payment reference.
    pub fn set_payment(
        &mut self,
        payment_id: impl Into<String>,
        provider: impl Into<String>,
        method: Option<String>,
    ) {
        self.payment_id = Some(payment_id.into());
        self.payment_provider = Some(provider.into());
        self.payment_method = method;
        self.updated_at = Utc::now();
    }

    /// Stores the redirect URL for a requires-action payment flow.
    pub fn set_action_url(&mut self, url: impl Into<String>) {
        self.action_url = Some(url.into());
        self.updated_at = Utc::now();
    }

    /// Clears the redirect URL once the flow resolves.
    pub fn clear_action_url(&mut self) {
        self.action_url = None;
        self.updated_at = Utc::now();
    }
}
