//! Checkout orchestration.

use chrono::{Duration, Utc};
use common::{CheckoutId, ProductId, SessionId, ShippingMethodId, UserId, VariantId};
use domain::{
    Address, AppliedDiscount, BasketLine, Checkout, CheckoutError, CheckoutOwner, Currency,
    CustomerDetails, DiscountBasket, DiscountKind, LineItem, Money, convert,
};
use store::{CheckoutStore, CurrencyStore, DiscountStore};

use crate::catalog::ProductCatalog;
use crate::error::{Error, Result};
use crate::notifications::{Notification, NotificationPool};
use crate::shipping::{ShippingQuote, ShippingRates};

/// How long a fresh checkout stays claimable before it expires.
const DEFAULT_TTL_HOURS: i64 = 48;

/// Service for managing checkouts.
///
/// Every operation is keyed by the owner (user or guest session); at most
/// one Active checkout exists per owner. All writes go through the store's
/// versioned update, so a concurrent writer surfaces as a conflict.
pub struct CheckoutService<CS, DS, CU, P, R> {
    checkouts: CS,
    discounts: DS,
    currencies: CU,
    catalog: P,
    rates: R,
    notifications: NotificationPool,
    ttl: Duration,
}

impl<CS, DS, CU, P, R> CheckoutService<CS, DS, CU, P, R>
where
    CS: CheckoutStore,
    DS: DiscountStore,
    CU: CurrencyStore,
    P: ProductCatalog,
    R: ShippingRates,
{
    /// Creates a new checkout service with the default expiry window.
    pub fn new(
        checkouts: CS,
        discounts: DS,
        currencies: CU,
        catalog: P,
        rates: R,
        notifications: NotificationPool,
    ) -> Self {
        Self {
            checkouts,
            discounts,
            currencies,
            catalog,
            rates,
            notifications,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    /// Overrides the checkout expiry window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the owner's Active checkout, creating one if none exists.
    ///
    /// An Active checkout found past its deadline is marked Expired and
    /// replaced with a fresh one.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, owner: &CheckoutOwner) -> Result<Checkout> {
        let now = Utc::now();
        if let Some(mut existing) = self.checkouts.find_active_by_owner(owner).await? {
            if !existing.is_expired(now) {
                return Ok(existing);
            }
            existing.mark_expired()?;
            self.checkouts.update(&mut existing).await?;
            tracing::info!(checkout_id = %existing.id(), "expired checkout replaced");
        }

        let currency = self
            .currencies
            .get_default()
            .await?
            .ok_or(Error::NoDefaultCurrency)?;
        let checkout = Checkout::new(
            CheckoutId::new(),
            owner.clone(),
            currency.code().clone(),
            now + self.ttl,
        );
        self.checkouts.insert(&checkout).await?;
        Ok(checkout)
    }

    /// Adds an item to the owner's checkout.
    ///
    /// The catalog supplies the price, name, SKU, and weight snapshot; the
    /// price is converted from the default currency into the checkout
    /// currency at add-time. Lines sharing a (product, variant) key merge.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CheckoutOwner,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: u32,
    ) -> Result<Checkout> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity { quantity }.into());
        }

        let mut checkout = self.get_or_create(owner).await?;
        let product = self.catalog.product(product_id).await?;
        if !product.active {
            return Err(Error::ProductInactive(product_id.clone()));
        }

        let (price, name, sku, weight) = match variant_id {
            Some(vid) => {
                let variant = product.variant(vid).ok_or_else(|| Error::VariantNotFound {
                    product_id: product_id.clone(),
                    variant_id: vid.clone(),
                })?;
                (
                    variant.price.clone(),
                    variant.name.clone(),
                    variant.sku.clone(),
                    variant.weight,
                )
            }
            None => (
                product.price.clone(),
                product.name.clone(),
                product.sku.clone(),
                product.weight,
            ),
        };

        let existing = checkout
            .get_item(product_id, variant_id)
            .map(|line| line.quantity)
            .unwrap_or(0);
        let wanted = existing + quantity;
        if !self
            .catalog
            .is_available(product_id, variant_id, wanted)
            .await?
        {
            return Err(Error::InsufficientStock {
                product_id: product_id.clone(),
                requested: wanted,
            });
        }

        let (default, target) = self.currency_pair(&checkout).await?;
        let unit_price = convert(&price, &default, &target)?;

        checkout.add_item(LineItem::new(
            product_id.clone(),
            variant_id.cloned(),
            quantity,
            unit_price,
            name,
            sku,
            weight,
        ))?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Sets the quantity of an existing line; zero removes it.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        owner: &CheckoutOwner,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: u32,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        if quantity > 0
            && !self
                .catalog
                .is_available(product_id, variant_id, quantity)
                .await?
        {
            return Err(Error::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            });
        }
        checkout.update_item(product_id, variant_id, quantity)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Removes a line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner: &CheckoutOwner,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.remove_item(product_id, variant_id)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Empties the checkout.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, owner: &CheckoutOwner) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.clear()?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Sets the shipping address.
    #[tracing::instrument(skip(self, address))]
    pub async fn set_shipping_address(
        &self,
        owner: &CheckoutOwner,
        address: Address,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.set_shipping_address(address)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Sets the billing address.
    #[tracing::instrument(skip(self, address))]
    pub async fn set_billing_address(
        &self,
        owner: &CheckoutOwner,
        address: Address,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.set_billing_address(address)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Sets the customer contact details.
    #[tracing::instrument(skip(self, customer))]
    pub async fn set_customer_details(
        &self,
        owner: &CheckoutOwner,
        customer: CustomerDetails,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.set_customer_details(customer)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Selects a payment provider.
    #[tracing::instrument(skip(self))]
    pub async fn set_payment_provider(
        &self,
        owner: &CheckoutOwner,
        provider: &str,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.set_payment_provider(provider)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Lists the shipping methods serving the checkout's address, with
    /// costs converted into the checkout currency.
    #[tracing::instrument(skip(self))]
    pub async fn shipping_options(&self, owner: &CheckoutOwner) -> Result<Vec<ShippingQuote>> {
        let checkout = self.active_checkout(owner).await?;
        let address = checkout
            .shipping_address()
            .ok_or(Error::ShippingAddressRequired)?;
        let quotes = self
            .rates
            .rates_for_address(address, checkout.total_amount(), checkout.total_weight())
            .await?;

        let (default, target) = self.currency_pair(&checkout).await?;
        quotes
            .into_iter()
            .map(|quote| {
                let cost = self.convert_cost(quote.cost, &default, &target)?;
                Ok(ShippingQuote { cost, ..quote })
            })
            .collect()
    }

    /// Selects a shipping method, resolving its cost through the
    /// shipping-rate collaborator.
    #[tracing::instrument(skip(self))]
    pub async fn set_shipping_method(
        &self,
        owner: &CheckoutOwner,
        method_id: &ShippingMethodId,
    ) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        let address = checkout
            .shipping_address()
            .ok_or(Error::ShippingAddressRequired)?;
        let quote = self
            .rates
            .quote(
                method_id,
                address,
                checkout.total_amount(),
                checkout.total_weight(),
            )
            .await?;

        let (default, target) = self.currency_pair(&checkout).await?;
        let cost = self.convert_cost(quote.cost, &default, &target)?;

        checkout.set_shipping_method(method_id.clone(), cost)?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Applies a discount code, replacing any previously applied discount.
    #[tracing::instrument(skip(self))]
    pub async fn apply_discount(&self, owner: &CheckoutOwner, code: &str) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        let discount = self
            .discounts
            .get_by_code(code)
            .await?
            .ok_or_else(|| Error::DiscountNotFound(code.to_string()))?;

        // Category membership comes from the catalog; only fetch it when
        // the discount actually targets categories.
        let need_categories =
            discount.kind == DiscountKind::Product && !discount.category_ids.is_empty();
        let mut lines = Vec::with_capacity(checkout.items().len());
        for item in checkout.items() {
            let categories = if need_categories {
                self.catalog.categories_for(&item.product_id).await?
            } else {
                Vec::new()
            };
            lines.push(BasketLine {
                product_id: item.product_id.clone(),
                subtotal: item.subtotal(),
                categories,
            });
        }

        let amount = discount.evaluate(&DiscountBasket { lines }, Utc::now())?;
        checkout.apply_discount(AppliedDiscount {
            discount_id: discount.id,
            code: discount.code.clone(),
            amount,
        })?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Removes the applied discount.
    #[tracing::instrument(skip(self))]
    pub async fn remove_discount(&self, owner: &CheckoutOwner) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.remove_discount()?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    /// Folds a guest checkout into the user's, or re-keys it when the user
    /// has none.
    ///
    /// Overlapping (product, variant) lines have their quantities summed;
    /// non-overlapping lines from both carts survive. The guest checkout is
    /// discarded after a merge.
    #[tracing::instrument(skip(self))]
    pub async fn convert_guest_to_user(
        &self,
        session: &SessionId,
        user: UserId,
    ) -> Result<Checkout> {
        let guest_owner = CheckoutOwner::Guest(session.clone());
        let mut guest = self.active_checkout(&guest_owner).await?;

        let user_owner = CheckoutOwner::User(user);
        match self.checkouts.find_active_by_owner(&user_owner).await? {
            Some(mut cart) => {
                cart.merge_from(&guest)?;
                self.checkouts.update(&mut cart).await?;
                self.checkouts.delete(guest.id()).await?;
                tracing::info!(from = %guest.id(), into = %cart.id(), "guest cart merged");
                Ok(cart)
            }
            None => {
                guest.convert_to_user(user)?;
                self.checkouts.update(&mut guest).await?;
                Ok(guest)
            }
        }
    }

    /// Marks the owner's checkout Abandoned and queues a recovery email.
    #[tracing::instrument(skip(self))]
    pub async fn mark_abandoned(&self, owner: &CheckoutOwner) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.mark_abandoned()?;
        self.checkouts.update(&mut checkout).await?;

        if let Some(customer) = checkout.customer()
            && !customer.email.is_empty()
        {
            self.notifications.dispatch(Notification::CheckoutRecovery {
                recipient: customer.email.clone(),
                checkout: checkout.clone(),
            });
        }
        Ok(checkout)
    }

    /// Marks the owner's checkout Expired.
    #[tracing::instrument(skip(self))]
    pub async fn mark_expired(&self, owner: &CheckoutOwner) -> Result<Checkout> {
        let mut checkout = self.active_checkout(owner).await?;
        checkout.mark_expired()?;
        self.checkouts.update(&mut checkout).await?;
        Ok(checkout)
    }

    async fn active_checkout(&self, owner: &CheckoutOwner) -> Result<Checkout> {
        self.checkouts
            .find_active_by_owner(owner)
            .await?
            .ok_or_else(|| Error::CheckoutNotFound {
                owner: owner.to_string(),
            })
    }

    async fn currency_pair(&self, checkout: &Checkout) -> Result<(Currency, Currency)> {
        let default = self
            .currencies
            .get_default()
            .await?
            .ok_or(Error::NoDefaultCurrency)?;
        let target = self
            .currencies
            .get(checkout.currency())
            .await?
            .ok_or_else(|| Error::CurrencyNotFound(checkout.currency().clone()))?;
        Ok((default, target))
    }

    fn convert_cost(&self, cost: i64, default: &Currency, target: &Currency) -> Result<i64> {
        let money = Money::new(cost, default.code().clone());
        Ok(convert(&money, default, target)?.minor_units())
    }
}
