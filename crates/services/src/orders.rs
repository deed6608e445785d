//! Order creation and status management.

use common::{DiscountId, OrderId, ProductId, UserId, VariantId};
use domain::{CheckoutOwner, DiscountError, Order, OrderStatus};
use store::{CheckoutStore, DiscountStore, OrderStore, StoreError};

use crate::catalog::ProductCatalog;
use crate::error::{Error, Result};
use crate::notifications::{Notification, NotificationPool};

/// Service for creating orders from checkouts and driving fulfilment
/// status.
///
/// Order creation is all-or-nothing: the discount usage slot and every
/// stock decrement are rolled back if any later step fails, so no partial
/// order is ever persisted.
pub struct OrderService<OS, CS, DS, P> {
    orders: OS,
    checkouts: CS,
    discounts: DS,
    catalog: P,
    notifications: NotificationPool,
    merchant_email: Option<String>,
}

impl<OS, CS, DS, P> OrderService<OS, CS, DS, P>
where
    OS: OrderStore,
    CS: CheckoutStore,
    DS: DiscountStore,
    P: ProductCatalog,
{
    /// Creates a new order service.
    pub fn new(
        orders: OS,
        checkouts: CS,
        discounts: DS,
        catalog: P,
        notifications: NotificationPool,
    ) -> Self {
        Self {
            orders,
            checkouts,
            discounts,
            catalog,
            notifications,
            merchant_email: None,
        }
    }

    /// Also sends a merchant copy of new-order notifications.
    pub fn with_merchant_email(mut self, email: impl Into<String>) -> Self {
        self.merchant_email = Some(email.into());
        self
    }

    /// Materializes the owner's Active checkout into a Pending order.
    ///
    /// Steps: validate and freeze the checkout snapshot, consume the
    /// discount usage slot, decrement stock per line, persist the order,
    /// mark the checkout Completed, and queue confirmation emails. Stock
    /// and usage mutations are compensated in reverse on any failure.
    #[tracing::instrument(skip(self))]
    pub async fn create_from_checkout(&self, owner: &CheckoutOwner) -> Result<Order> {
        let mut checkout = self
            .checkouts
            .find_active_by_owner(owner)
            .await?
            .ok_or_else(|| Error::CheckoutNotFound {
                owner: owner.to_string(),
            })?;

        let order = Order::from_checkout(OrderId::new(), &checkout)?;

        let discount_id = order.applied_discount().map(|d| d.discount_id);
        if let Some(id) = discount_id
            && !self.discounts.increment_usage(id).await?
        {
            let code = order
                .applied_discount()
                .map(|d| d.code.clone())
                .unwrap_or_default();
            return Err(DiscountError::Invalid { code }.into());
        }

        let mut decremented: Vec<(ProductId, Option<VariantId>, u32)> = Vec::new();
        for item in order.items() {
            match self
                .catalog
                .adjust_stock(
                    &item.product_id,
                    item.variant_id.as_ref(),
                    -i64::from(item.quantity),
                )
                .await
            {
                Ok(()) => decremented.push((
                    item.product_id.clone(),
                    item.variant_id.clone(),
                    item.quantity,
                )),
                Err(err) => {
                    self.compensate(&decremented, discount_id).await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.orders.insert(&order).await {
            self.compensate(&decremented, discount_id).await;
            return Err(err.into());
        }

        checkout.mark_completed(order.id())?;
        if let Err(err) = self.checkouts.update(&mut checkout).await {
            match err {
                // A concurrent basket write raced us; retry once against
                // the latest copy so the owner is not left with an Active
                // checkout for an already-created order.
                StoreError::ConcurrencyConflict { .. } => {
                    let mut latest = self
                        .checkouts
                        .get(checkout.id())
                        .await?
                        .ok_or_else(|| Error::CheckoutNotFound {
                            owner: owner.to_string(),
                        })?;
                    latest.mark_completed(order.id())?;
                    self.checkouts.update(&mut latest).await?;
                }
                other => return Err(other.into()),
            }
        }

        self.notifications.dispatch(Notification::OrderConfirmation {
            recipient: order.customer().email.clone(),
            order: order.clone(),
        });
        if let Some(merchant) = &self.merchant_email {
            self.notifications.dispatch(Notification::OrderNotification {
                recipient: merchant.clone(),
                order: order.clone(),
            });
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id(), amount = order.final_amount(), "order created");
        Ok(order)
    }

    /// Loads an order.
    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(Error::OrderNotFound(order_id))
    }

    /// Loads an order on behalf of a user, verifying ownership.
    pub async fn get_for_user(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let order = self.get(order_id).await?;
        if order.user_id() != Some(user_id) {
            return Err(Error::Unauthorized(order_id));
        }
        Ok(order)
    }

    /// Lists a user's orders, most recent first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    /// Applies a fulfilment status change (e.g. Shipped, Delivered),
    /// validated against the closed transition table.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut order = self.get(order_id).await?;
        order.update_status(status)?;
        self.orders.update(&mut order).await?;
        tracing::info!(order_id = %order_id, status = %status, "order status updated");
        Ok(order)
    }

    async fn compensate(
        &self,
        decremented: &[(ProductId, Option<VariantId>, u32)],
        discount_id: Option<DiscountId>,
    ) {
        for (product_id, variant_id, quantity) in decremented.iter().rev() {
            if let Err(err) = self
                .catalog
                .adjust_stock(product_id, variant_id.as_ref(), i64::from(*quantity))
                .await
            {
                tracing::error!(product_id = %product_id, error = %err, "stock compensation failed");
            }
        }
        if let Some(id) = discount_id
            && let Err(err) = self.discounts.release_usage(id).await
        {
            tracing::error!(discount_id = %id, error = %err, "discount usage compensation failed");
        }
    }
}
