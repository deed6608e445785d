//! Payment ledger operations: authorize, capture, cancel, refund.
//!
//! Every gateway outcome, including transport errors and timeouts, is
//! recorded as a ledger transaction before any error is surfaced, so the
//! audit history survives callers that never retry. Ledger mutations are
//! serialized per order through an in-process lock map, on top of the
//! store's optimistic version check.

use std::collections::HashMap;
use std::sync::Arc;

use common::{OrderId, TransactionId};
use domain::{
    Ledger, Money, Order, OrderStatus, PaymentTransaction, TransactionKind, TransactionStatus,
};
use store::{OrderStore, TransactionStore};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::gateway::{PaymentGateway, PaymentRequest};

/// Lazily-created per-order locks.
///
/// Repeated calls for the same order return the same lock, so capture and
/// refund on one order can never interleave their read-check-write
/// sequences.
#[derive(Clone, Default)]
struct OrderLocks {
    locks: Arc<Mutex<HashMap<OrderId, Arc<Mutex<()>>>>>,
}

impl OrderLocks {
    async fn acquire(&self, order_id: OrderId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(order_id).or_default())
        };
        lock.lock_owned().await
    }
}

/// Service driving the append-only payment ledger of each order.
pub struct PaymentService<OS, TS, G> {
    orders: OS,
    transactions: TS,
    gateway: G,
    locks: OrderLocks,
}

impl<OS, TS, G> PaymentService<OS, TS, G>
where
    OS: OrderStore,
    TS: TransactionStore,
    G: PaymentGateway,
{
    /// Creates a new payment service.
    pub fn new(orders: OS, transactions: TS, gateway: G) -> Self {
        Self {
            orders,
            transactions,
            gateway,
            locks: OrderLocks::default(),
        }
    }

    /// Returns an order's ledger in append order.
    pub async fn ledger(&self, order_id: OrderId) -> Result<Vec<PaymentTransaction>> {
        Ok(self.transactions.list_for_order(order_id).await?)
    }

    /// Starts payment for an order.
    ///
    /// Rejects orders whose status already indicates payment and providers
    /// that are not enabled. The gateway outcome decides the rest: success
    /// moves the order to Paid, requires-action to PendingAction, and a
    /// failure (or transport error) leaves the order unchanged behind a
    /// Failed Authorize row.
    #[tracing::instrument(skip(self, details))]
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        method: &str,
        provider: &str,
        details: HashMap<String, String>,
    ) -> Result<PaymentTransaction> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load_order(order_id).await?;

        if order.status().indicates_payment() {
            return Err(Error::AlreadyPaid(order_id));
        }

        let providers = self.gateway.available_providers().await?;
        if !providers
            .iter()
            .any(|p| p.provider == provider && p.enabled)
        {
            return Err(Error::ProviderUnavailable(provider.to_string()));
        }

        let amount = order.final_money();
        let request = PaymentRequest {
            order_id,
            amount: amount.clone(),
            method: method.to_string(),
            provider: provider.to_string(),
            details,
        };

        metrics::counter!("payments_attempted_total").increment(1);
        match self.gateway.authorize(request).await {
            Err(err) => {
                // Transport error or timeout: record it as a failure.
                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Authorize,
                    TransactionStatus::Failed,
                    amount,
                    provider,
                )
                .with_metadata("error", err.to_string());
                self.transactions.append(&txn).await?;
                metrics::counter!("payments_failed_total").increment(1);
                Err(err)
            }
            Ok(resp) if resp.requires_action => {
                if order.status() != OrderStatus::PendingAction {
                    order.update_status(OrderStatus::PendingAction)?;
                }
                order.set_payment(resp.transaction_id.clone(), provider, None);
                if let Some(url) = &resp.action_url {
                    order.set_action_url(url.clone());
                }
                self.orders.update(&mut order).await?;

                let mut txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Authorize,
                    TransactionStatus::Pending,
                    amount,
                    provider,
                )
                .with_external_id(resp.transaction_id);
                if let Some(url) = resp.action_url {
                    txn = txn.with_metadata("action_url", url);
                }
                self.transactions.append(&txn).await?;
                tracing::info!(order_id = %order_id, "payment requires shopper action");
                Ok(txn)
            }
            Ok(resp) if !resp.success => {
                let message = resp
                    .error_message
                    .unwrap_or_else(|| "payment declined".to_string());
                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Authorize,
                    TransactionStatus::Failed,
                    amount,
                    provider,
                )
                .with_external_id(resp.transaction_id)
                .with_metadata("error", message.clone());
                self.transactions.append(&txn).await?;
                metrics::counter!("payments_failed_total").increment(1);
                Err(Error::GatewayRejected(message))
            }
            Ok(resp) => {
                order.update_status(OrderStatus::Paid)?;
                order.set_payment(
                    resp.transaction_id.clone(),
                    provider,
                    Some(method.to_string()),
                );
                self.orders.update(&mut order).await?;

                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Authorize,
                    TransactionStatus::Successful,
                    amount,
                    provider,
                )
                .with_external_id(resp.transaction_id);
                self.transactions.append(&txn).await?;
                metrics::counter!("payments_succeeded_total").increment(1);
                tracing::info!(order_id = %order_id, "payment authorized");
                Ok(txn)
            }
        }
    }

    /// Completes a requires-action flow after the shopper finished the
    /// extra step: the Pending authorization becomes Successful and the
    /// order moves to Paid.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: OrderId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load_order(order_id).await?;

        let rows = self.transactions.list_for_order(order_id).await?;
        let pending = rows
            .iter()
            .rev()
            .find(|t| {
                t.kind() == TransactionKind::Authorize && t.status() == TransactionStatus::Pending
            })
            .ok_or(Error::NoPendingAuthorization(order_id))?;

        order.update_status(OrderStatus::Paid)?;
        order.clear_action_url();
        self.orders.update(&mut order).await?;
        self.transactions
            .update_status(pending.id(), TransactionStatus::Successful, Vec::new())
            .await?;
        tracing::info!(order_id = %order_id, "pending payment confirmed");
        Ok(order)
    }

    /// Captures authorized funds.
    ///
    /// The order must be Paid and the amount within its final amount. The
    /// ledger records whether the capture was full or partial and what
    /// remains capturable.
    #[tracing::instrument(skip(self))]
    pub async fn capture(
        &self,
        transaction_id: TransactionId,
        amount: i64,
    ) -> Result<PaymentTransaction> {
        let source = self.load_transaction(transaction_id).await?;
        let order_id = source.order_id();
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load_order(order_id).await?;

        if order.status() != OrderStatus::Paid {
            return Err(Error::CaptureNotAllowed {
                status: order.status(),
            });
        }

        let rows = self.transactions.list_for_order(order_id).await?;
        Ledger::new(&rows).check_capture(amount, order.final_amount())?;

        let money = Money::new(amount, order.currency().clone());
        let external = source.external_id().unwrap_or_default().to_string();
        match self
            .gateway
            .capture(&external, &money, source.provider())
            .await
        {
            Ok(()) => {
                order.update_status(OrderStatus::Captured)?;
                self.orders.update(&mut order).await?;

                let full = amount >= order.final_amount();
                let remaining = (order.final_amount() - amount).max(0);
                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Capture,
                    TransactionStatus::Successful,
                    money,
                    source.provider(),
                )
                .with_external_id(external)
                .with_metadata("full_capture", full.to_string())
                .with_metadata("remaining_amount", remaining.to_string());
                self.transactions.append(&txn).await?;
                metrics::counter!("captures_total").increment(1);
                tracing::info!(order_id = %order_id, amount, full, "payment captured");
                Ok(txn)
            }
            Err(err) => {
                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Capture,
                    TransactionStatus::Failed,
                    money,
                    source.provider(),
                )
                .with_external_id(external)
                .with_metadata("error", err.to_string());
                self.transactions.append(&txn).await?;
                metrics::counter!("captures_failed_total").increment(1);
                Err(err)
            }
        }
    }

    /// Voids a pending authorization and cancels the order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, transaction_id: TransactionId) -> Result<PaymentTransaction> {
        let source = self.load_transaction(transaction_id).await?;
        let order_id = source.order_id();
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load_order(order_id).await?;

        if order.status() != OrderStatus::PendingAction {
            return Err(Error::CancelNotAllowed {
                status: order.status(),
            });
        }

        let money = order.final_money();
        let external = source.external_id().unwrap_or_default().to_string();
        match self.gateway.void(&external, source.provider()).await {
            Ok(()) => {
                order.update_status(OrderStatus::Cancelled)?;
                order.clear_action_url();
                self.orders.update(&mut order).await?;

                if source.status() == TransactionStatus::Pending {
                    self.transactions
                        .update_status(
                            source.id(),
                            TransactionStatus::Failed,
                            vec![("voided".into(), "true".into())],
                        )
                        .await?;
                }

                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Cancel,
                    TransactionStatus::Successful,
                    money,
                    source.provider(),
                )
                .with_external_id(external);
                self.transactions.append(&txn).await?;
                metrics::counter!("cancellations_total").increment(1);
                tracing::info!(order_id = %order_id, "payment cancelled");
                Ok(txn)
            }
            Err(err) => {
                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Cancel,
                    TransactionStatus::Failed,
                    money,
                    source.provider(),
                )
                .with_external_id(external)
                .with_metadata("error", err.to_string());
                self.transactions.append(&txn).await?;
                Err(err)
            }
        }
    }

    /// Refunds part or all of a paid order.
    ///
    /// The running total of successful refunds can never exceed the
    /// order's final amount; a refund that completes the total moves the
    /// order to Refunded. Every outcome, including a rejected amount,
    /// appends a ledger row.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        transaction_id: TransactionId,
        amount: i64,
    ) -> Result<PaymentTransaction> {
        let source = self.load_transaction(transaction_id).await?;
        let order_id = source.order_id();
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load_order(order_id).await?;

        if !matches!(order.status(), OrderStatus::Paid | OrderStatus::Captured) {
            return Err(Error::RefundNotAllowed {
                status: order.status(),
            });
        }

        let rows = self.transactions.list_for_order(order_id).await?;
        let ledger = Ledger::new(&rows);
        let refunded_before = ledger.refunded_total();
        let money = Money::new(amount, order.currency().clone());
        let external = source.external_id().unwrap_or_default().to_string();

        if let Err(err) = ledger.check_refund(amount, order.final_amount()) {
            let txn = PaymentTransaction::new(
                order_id,
                TransactionKind::Refund,
                TransactionStatus::Failed,
                money,
                source.provider(),
            )
            .with_external_id(external)
            .with_metadata("error", err.to_string());
            self.transactions.append(&txn).await?;
            metrics::counter!("refunds_rejected_total").increment(1);
            return Err(err.into());
        }

        match self
            .gateway
            .refund(&external, &money, source.provider())
            .await
        {
            Ok(()) => {
                let cumulative = refunded_before + amount;
                let remaining = (order.final_amount() - cumulative).max(0);
                let full = cumulative >= order.final_amount();
                if full {
                    order.update_status(OrderStatus::Refunded)?;
                    self.orders.update(&mut order).await?;
                }

                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Refund,
                    TransactionStatus::Successful,
                    money,
                    source.provider(),
                )
                .with_external_id(external)
                .with_metadata("cumulative_refunded", cumulative.to_string())
                .with_metadata("remaining_available", remaining.to_string());
                self.transactions.append(&txn).await?;
                metrics::counter!("refunds_total").increment(1);
                tracing::info!(order_id = %order_id, amount, cumulative, "payment refunded");
                Ok(txn)
            }
            Err(err) => {
                let txn = PaymentTransaction::new(
                    order_id,
                    TransactionKind::Refund,
                    TransactionStatus::Failed,
                    money,
                    source.provider(),
                )
                .with_external_id(external)
                .with_metadata("error", err.to_string());
                self.transactions.append(&txn).await?;
                metrics::counter!("refunds_failed_total").increment(1);
                Err(err)
            }
        }
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(Error::OrderNotFound(order_id))
    }

    async fn load_transaction(&self, id: TransactionId) -> Result<PaymentTransaction> {
        self.transactions
            .get(id)
            .await?
            .ok_or(Error::TransactionNotFound(id))
    }
}
