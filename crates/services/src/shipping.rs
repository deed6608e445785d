//! Shipping-rate collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use common::ShippingMethodId;
use domain::Address;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// A resolved shipping cost for one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingQuote {
    /// The quoted method.
    pub method_id: ShippingMethodId,
    /// Method display name.
    pub name: String,
    /// Resolved cost in minor units of the default currency.
    pub cost: i64,
}

/// Collaborator contract for shipping-rate resolution.
#[async_trait]
pub trait ShippingRates: Send + Sync {
    /// Quotes a single method against an address, order value, and weight.
    async fn quote(
        &self,
        method_id: &ShippingMethodId,
        address: &Address,
        order_value: i64,
        weight: u64,
    ) -> Result<ShippingQuote>;

    /// Returns every method serving the address, cheapest first.
    async fn rates_for_address(
        &self,
        address: &Address,
        order_value: i64,
        weight: u64,
    ) -> Result<Vec<ShippingQuote>>;
}

/// A weight tier: applies when the parcel weight is at most `max_weight`.
#[derive(Debug, Clone)]
pub struct WeightTier {
    /// Upper bound in grams, inclusive.
    pub max_weight: u64,
    /// Tier cost in minor units.
    pub cost: i64,
}

/// A value tier: applies when the order value is at least `min_value`.
#[derive(Debug, Clone)]
pub struct ValueTier {
    /// Lower bound in minor units, inclusive.
    pub min_value: i64,
    /// Tier cost in minor units.
    pub cost: i64,
}

/// A configurable shipping rate.
///
/// Cost resolution: start from `base_cost`; the matching weight tier (the
/// first, lowest bound that fits) overrides it; the matching value tier
/// (the highest bound reached) overrides that; an order value at or above
/// `free_over` makes shipping free.
#[derive(Debug, Clone)]
pub struct RateDefinition {
    /// Method identifier.
    pub method_id: ShippingMethodId,
    /// Method display name.
    pub name: String,
    /// Base cost in minor units.
    pub base_cost: i64,
    /// Weight-tier overrides, sorted by `max_weight` ascending.
    pub weight_tiers: Vec<WeightTier>,
    /// Value-tier overrides, sorted by `min_value` ascending.
    pub value_tiers: Vec<ValueTier>,
    /// Free-shipping threshold in minor units.
    pub free_over: Option<i64>,
    /// Countries served; empty serves everywhere.
    pub countries: Vec<String>,
}

impl RateDefinition {
    /// A flat rate with no tiers.
    pub fn flat(method_id: impl Into<ShippingMethodId>, name: impl Into<String>, cost: i64) -> Self {
        Self {
            method_id: method_id.into(),
            name: name.into(),
            base_cost: cost,
            weight_tiers: Vec::new(),
            value_tiers: Vec::new(),
            free_over: None,
            countries: Vec::new(),
        }
    }

    fn serves(&self, address: &Address) -> bool {
        self.countries.is_empty() || self.countries.iter().any(|c| c == &address.country)
    }

    fn resolve(&self, order_value: i64, weight: u64) -> i64 {
        if let Some(threshold) = self.free_over
            && order_value >= threshold
        {
            return 0;
        }

        let mut cost = self.base_cost;
        if let Some(tier) = self
            .weight_tiers
            .iter()
            .find(|tier| weight <= tier.max_weight)
        {
            cost = tier.cost;
        }
        if let Some(tier) = self
            .value_tiers
            .iter()
            .rev()
            .find(|tier| order_value >= tier.min_value)
        {
            cost = tier.cost;
        }
        cost
    }
}

/// In-memory rate table for testing.
#[derive(Clone, Default)]
pub struct InMemoryShippingRates {
    rates: Arc<RwLock<Vec<RateDefinition>>>,
}

impl InMemoryShippingRates {
    /// Creates a new empty rate table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rate definition.
    pub async fn put(&self, rate: RateDefinition) {
        let mut rates = self.rates.write().await;
        rates.retain(|r| r.method_id != rate.method_id);
        rates.push(rate);
    }
}

#[async_trait]
impl ShippingRates for InMemoryShippingRates {
    async fn quote(
        &self,
        method_id: &ShippingMethodId,
        address: &Address,
        order_value: i64,
        weight: u64,
    ) -> Result<ShippingQuote> {
        let rates = self.rates.read().await;
        let rate = rates
            .iter()
            .find(|r| r.method_id == *method_id && r.serves(address))
            .ok_or_else(|| Error::ShippingMethodUnavailable(method_id.clone()))?;
        Ok(ShippingQuote {
            method_id: rate.method_id.clone(),
            name: rate.name.clone(),
            cost: rate.resolve(order_value, weight),
        })
    }

    async fn rates_for_address(
        &self,
        address: &Address,
        order_value: i64,
        weight: u64,
    ) -> Result<Vec<ShippingQuote>> {
        let rates = self.rates.read().await;
        let mut quotes: Vec<_> = rates
            .iter()
            .filter(|r| r.serves(address))
            .map(|r| ShippingQuote {
                method_id: r.method_id.clone(),
                name: r.name.clone(),
                cost: r.resolve(order_value, weight),
            })
            .collect();
        quotes.sort_by_key(|q| q.cost);
        Ok(quotes)
    }
}
