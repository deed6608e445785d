//! Checkout aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CheckoutId, OrderId, ProductId, SessionId, ShippingMethodId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use crate::address::{Address, CustomerDetails};
use crate::discount::AppliedDiscount;
use crate::line_item::LineItem;
use crate::money::CurrencyCode;

use super::{CheckoutError, CheckoutStatus};

/// Who owns a checkout: a registered user or an anonymous session.
///
/// Guest checkouts carry no user id; the two are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckoutOwner {
    /// A registered user.
    User(UserId),
    /// A guest identified only by a session token.
    Guest(SessionId),
}

impl CheckoutOwner {
    /// Returns the user id when the owner is a registered user.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CheckoutOwner::User(id) => Some(*id),
            CheckoutOwner::Guest(_) => None,
        }
    }

    /// Returns true for guest ownership.
    pub fn is_guest(&self) -> bool {
        matches!(self, CheckoutOwner::Guest(_))
    }
}

impl std::fmt::Display for CheckoutOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutOwner::User(id) => write!(f, "user:{id}"),
            CheckoutOwner::Guest(id) => write!(f, "session:{id}"),
        }
    }
}

/// Checkout aggregate root: the mutable pre-purchase basket.
///
/// Every mutating operation requires Active status and re-derives the
/// totals (`total_amount`, `discount_amount`, `final_amount`,
/// `total_weight`) before returning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    id: CheckoutId,
    owner: CheckoutOwner,
    currency: CurrencyCode,
    items: Vec<LineItem>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    customer: Option<CustomerDetails>,
    shipping_method: Option<ShippingMethodId>,
    shipping_cost: i64,
    applied_discount: Option<AppliedDiscount>,
    payment_provider: Option<String>,
    status: CheckoutStatus,
    total_amount: i64,
    discount_amount: i64,
    final_amount: i64,
    total_weight: u64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    order_id: Option<OrderId>,
    #[serde(default)]
    version: u64,
}

// Query methods
impl Checkout {
    /// Creates a new empty Active checkout.
    pub fn new(
        id: CheckoutId,
        owner: CheckoutOwner,
        currency: CurrencyCode,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            currency,
            items: Vec::new(),
            shipping_address: None,
            billing_address: None,
            customer: None,
            shipping_method: None,
            shipping_cost: 0,
            applied_discount: None,
            payment_provider: None,
            status: CheckoutStatus::Active,
            total_amount: 0,
            discount_amount: 0,
            final_amount: 0,
            total_weight: 0,
            expires_at,
            created_at: now,
            updated_at: now,
            order_id: None,
            version: 0,
        }
    }

    /// Returns the checkout id.
    pub fn id(&self) -> CheckoutId {
        self.id
    }

    /// Returns the owner.
    pub fn owner(&self) -> &CheckoutOwner {
        &self.owner
    }

    /// Returns the checkout currency.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Returns the line items in insertion order.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Returns a line by its (product, variant) key.
    pub fn get_item(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Option<&LineItem> {
        self.items
            .iter()
            .find(|item| item.same_key(product_id, variant_id))
    }

    /// Returns true if the checkout has at least one item.
    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Returns the shipping address, if set.
    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    /// Returns the billing address, if set.
    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    /// Returns the customer contact details, if set.
    pub fn customer(&self) -> Option<&CustomerDetails> {
        self.customer.as_ref()
    }

    /// Returns the selected shipping method, if any.
    pub fn shipping_method(&self) -> Option<&ShippingMethodId> {
        self.shipping_method.as_ref()
    }

    /// Returns the computed shipping cost in minor units.
    pub fn shipping_cost(&self) -> i64 {
        self.shipping_cost
    }

    /// Returns the applied discount snapshot, if any.
    pub fn applied_discount(&self) -> Option<&AppliedDiscount> {
        self.applied_discount.as_ref()
    }

    /// Returns the selected payment provider, if any.
    pub fn payment_provider(&self) -> Option<&str> {
        self.payment_provider.as_deref()
    }

    /// Returns the current status.
    pub fn status(&self) -> CheckoutStatus {
        self.status
    }

    /// Returns the pre-discount items total in minor units.
    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }

    /// Returns the applied discount amount in minor units.
    pub fn discount_amount(&self) -> i64 {
        self.discount_amount
    }

    /// Returns the payable amount: total − discount + shipping.
    pub fn final_amount(&self) -> i64 {
        self.final_amount
    }

    /// Returns the total weight in grams.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the expiry deadline.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns when the checkout was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the checkout was last mutated.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the order this checkout completed into, if any.
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    /// Returns true if the checkout is Active but past its deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CheckoutStatus::Active && now > self.expires_at
    }

    /// Returns the version for optimistic concurrency.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sets the version; called by the store after a successful write.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

// Mutating operations
impl Checkout {
    /// Adds an item, merging with an existing line sharing the same
    /// (product, variant) key by summing quantities.
    pub fn add_item(&mut self, item: LineItem) -> Result<(), CheckoutError> {
        self.ensure_active("add item")?;

        if item.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity {
                quantity: item.quantity,
            });
        }
        if item.unit_price.currency() != &self.currency {
            return Err(CheckoutError::CurrencyMismatch {
                item: item.unit_price.currency().clone(),
                checkout: self.currency.clone(),
            });
        }

        match self
            .items
            .iter()
            .position(|line| line.same_key(&item.product_id, item.variant_id.as_ref()))
        {
            Some(index) => self.items[index].quantity += item.quantity,
            None => self.items.push(item),
        }

        self.recalculate();
        Ok(())
    }

    /// Updates the quantity of an existing line.
    ///
    /// A quantity of zero removes the line.
    pub fn update_item(
        &mut self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: u32,
    ) -> Result<(), CheckoutError> {
        self.ensure_active("update item")?;

        let index = self
            .items
            .iter()
            .position(|line| line.same_key(product_id, variant_id))
            .ok_or_else(|| CheckoutError::ItemNotFound {
                product_id: product_id.clone(),
                variant_id: variant_id.cloned(),
            })?;

        if quantity == 0 {
            self.items.remove(index);
        } else {
            self.items[index].quantity = quantity;
        }

        self.recalculate();
        Ok(())
    }

    /// Removes a line by its (product, variant) key.
    pub fn remove_item(
        &mut self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<(), CheckoutError> {
        self.ensure_active("remove item")?;

        let index = self
            .items
            .iter()
            .position(|line| line.same_key(product_id, variant_id))
            .ok_or_else(|| CheckoutError::ItemNotFound {
                product_id: product_id.clone(),
                variant_id: variant_id.cloned(),
            })?;

        self.items.remove(index);
        self.recalculate();
        Ok(())
    }

    /// Empties items, discount, and shipping selection. Idempotent.
    pub fn clear(&mut self) -> Result<(), CheckoutError> {
        self.ensure_active("clear")?;

        self.items.clear();
        self.applied_discount = None;
        self.shipping_method = None;
        self.shipping_cost = 0;
        self.recalculate();
        Ok(())
    }

    /// Sets the shipping address.
    pub fn set_shipping_address(&mut self, address: Address) -> Result<(), CheckoutError> {
        self.ensure_active("set shipping address")?;
        self.shipping_address = Some(address);
        self.touch();
        Ok(())
    }

    /// Sets the billing address.
    pub fn set_billing_address(&mut self, address: Address) -> Result<(), CheckoutError> {
        self.ensure_active("set billing address")?;
        self.billing_address = Some(address);
        self.touch();
        Ok(())
    }

    /// Sets the customer contact details.
    pub fn set_customer_details(&mut self, customer: CustomerDetails) -> Result<(), CheckoutError> {
        self.ensure_active("set customer details")?;
        self.customer = Some(customer);
        self.touch();
        Ok(())
    }

    /// Selects a payment provider.
    pub fn set_payment_provider(&mut self, provider: impl Into<String>) -> Result<(), CheckoutError> {
        self.ensure_active("set payment provider")?;
        self.payment_provider = Some(provider.into());
        self.touch();
        Ok(())
    }

    /// Stores the selected shipping method and its resolved cost.
    pub fn set_shipping_method(
        &mut self,
        method: ShippingMethodId,
        cost: i64,
    ) -> Result<(), CheckoutError> {
        self.ensure_active("set shipping method")?;
        self.shipping_method = Some(method);
        self.shipping_cost = cost;
        self.recalculate();
        Ok(())
    }

    /// Applies a discount snapshot, replacing any previous one.
    pub fn apply_discount(&mut self, discount: AppliedDiscount) -> Result<(), CheckoutError> {
        self.ensure_active("apply discount")?;
        self.applied_discount = Some(discount);
        self.recalculate();
        Ok(())
    }

    /// Removes the applied discount, resetting the discount amount to zero.
    pub fn remove_discount(&mut self) -> Result<(), CheckoutError> {
        self.ensure_active("remove discount")?;
        self.applied_discount = None;
        self.recalculate();
        Ok(())
    }

    /// Merges another checkout's lines into this one.
    ///
    /// Lines sharing a (product, variant) key have their quantities summed;
    /// the rest are appended. Used when a guest cart folds into an existing
    /// user cart. Both checkouts must share a currency.
    pub fn merge_from(&mut self, other: &Checkout) -> Result<(), CheckoutError> {
        self.ensure_active("merge")?;
        if other.currency != self.currency {
            return Err(CheckoutError::CurrencyMismatch {
                item: other.currency.clone(),
                checkout: self.currency.clone(),
            });
        }

        for item in &other.items {
            match self
                .items
                .iter()
                .position(|line| line.same_key(&item.product_id, item.variant_id.as_ref()))
            {
                Some(index) => self.items[index].quantity += item.quantity,
                None => self.items.push(item.clone()),
            }
        }

        self.recalculate();
        Ok(())
    }

    /// Re-keys a guest checkout to a registered user.
    ///
    /// Used when a guest signs in and has no existing cart to merge into.
    pub fn convert_to_user(&mut self, user_id: UserId) -> Result<(), CheckoutError> {
        self.ensure_active("convert to user")?;
        self.owner = CheckoutOwner::User(user_id);
        self.touch();
        Ok(())
    }

    /// Marks the checkout Completed, referencing the order it became.
    pub fn mark_completed(&mut self, order_id: OrderId) -> Result<(), CheckoutError> {
        self.ensure_transition("complete")?;
        self.status = CheckoutStatus::Completed;
        self.order_id = Some(order_id);
        self.touch();
        Ok(())
    }

    /// Marks the checkout Abandoned.
    pub fn mark_abandoned(&mut self) -> Result<(), CheckoutError> {
        self.ensure_transition("abandon")?;
        self.status = CheckoutStatus::Abandoned;
        self.touch();
        Ok(())
    }

    /// Marks the checkout Expired.
    pub fn mark_expired(&mut self) -> Result<(), CheckoutError> {
        self.ensure_transition("expire")?;
        self.status = CheckoutStatus::Expired;
        self.touch();
        Ok(())
    }

    fn ensure_active(&self, action: &'static str) -> Result<(), CheckoutError> {
        if !self.status.can_modify() {
            return Err(CheckoutError::InvalidStatusTransition {
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    fn ensure_transition(&self, action: &'static str) -> Result<(), CheckoutError> {
        // The checkout machine only transitions out of Active.
        self.ensure_active(action)
    }

    fn recalculate(&mut self) {
        self.total_amount = self.items.iter().map(LineItem::subtotal).sum();
        self.total_weight = self.items.iter().map(LineItem::weight).sum();
        self.discount_amount = self
            .applied_discount
            .as_ref()
            .map(|d| d.amount.min(self.total_amount))
            .unwrap_or(0);
        self.final_amount = self.total_amount - self.discount_amount + self.shipping_cost;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
