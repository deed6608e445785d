//! Fire-and-forget notification dispatch.
//!
//! Notifications run on a bounded worker pool rather than as unmanaged
//! detached tasks, so failures and backlog are observable: a full queue
//! drops the job with a logged warning and a metrics counter, and worker
//! failures are logged, never propagated to the operation that triggered
//! them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::{Checkout, Order};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::Result;

/// Collaborator contract for outbound email.
///
/// All sends are best-effort; callers log failures and move on.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the customer their order confirmation.
    async fn send_order_confirmation(&self, order: &Order, recipient: &str) -> Result<()>;

    /// Notifies the merchant of a new order.
    async fn send_order_notification(&self, order: &Order, recipient: &str) -> Result<()>;

    /// Sends a recovery nudge for an abandoned checkout.
    async fn send_recovery_email(&self, checkout: &Checkout, recipient: &str) -> Result<()>;
}

/// A queued notification job.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Customer-facing order confirmation.
    OrderConfirmation {
        /// The order to describe.
        order: Order,
        /// Customer email.
        recipient: String,
    },
    /// Merchant-facing new-order notification.
    OrderNotification {
        /// The order to describe.
        order: Order,
        /// Merchant email.
        recipient: String,
    },
    /// Abandoned-checkout recovery nudge.
    CheckoutRecovery {
        /// The abandoned checkout.
        checkout: Checkout,
        /// Customer email.
        recipient: String,
    },
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Notification::OrderConfirmation { .. } => "order_confirmation",
            Notification::OrderNotification { .. } => "order_notification",
            Notification::CheckoutRecovery { .. } => "checkout_recovery",
        }
    }
}

/// Bounded background worker pool for notifications.
#[derive(Clone)]
pub struct NotificationPool {
    tx: mpsc::Sender<Notification>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    enqueued: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
}

impl NotificationPool {
    /// Starts `workers` tasks draining a queue of `capacity` jobs.
    pub fn start(mailer: Arc<dyn Mailer>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Notification>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let processed = Arc::new(AtomicU64::new(0));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let mailer = Arc::clone(&mailer);
                let processed = Arc::clone(&processed);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        deliver(&*mailer, job, worker).await;
                        processed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        Self {
            tx,
            workers: Arc::new(Mutex::new(handles)),
            enqueued: Arc::new(AtomicU64::new(0)),
            processed,
        }
    }

    /// Enqueues a job without blocking.
    ///
    /// A full queue drops the job; the drop is logged and counted, and the
    /// caller is never delayed or failed by it.
    pub fn dispatch(&self, notification: Notification) {
        let kind = notification.kind();
        match self.tx.try_send(notification) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("notifications_enqueued_total").increment(1);
            }
            Err(err) => {
                metrics::counter!("notifications_dropped_total").increment(1);
                tracing::warn!(kind, error = %err, "notification queue full, job dropped");
            }
        }
    }

    /// Waits until every enqueued job has been processed.
    pub async fn drain(&self) {
        while self.processed.load(Ordering::SeqCst) < self.enqueued.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    /// Drains the queue, then stops the workers.
    ///
    /// Worker tasks exit once every clone of the pool has been dropped;
    /// this call waits for the queue to empty and detaches the handles.
    pub async fn shutdown(self) {
        self.drain().await;
        drop(self.tx);
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn deliver(mailer: &dyn Mailer, job: Notification, worker: usize) {
    let kind = job.kind();
    let outcome = match &job {
        Notification::OrderConfirmation { order, recipient } => {
            mailer.send_order_confirmation(order, recipient).await
        }
        Notification::OrderNotification { order, recipient } => {
            mailer.send_order_notification(order, recipient).await
        }
        Notification::CheckoutRecovery { checkout, recipient } => {
            mailer.send_recovery_email(checkout, recipient).await
        }
    };

    match outcome {
        Ok(()) => {
            metrics::counter!("notifications_sent_total").increment(1);
            tracing::debug!(kind, worker, "notification delivered");
        }
        Err(err) => {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(kind, worker, error = %err, "notification delivery failed");
        }
    }
}

/// In-memory mailer for testing.
#[derive(Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<std::sync::RwLock<InMemoryMailerState>>,
}

#[derive(Default)]
struct InMemoryMailerState {
    sent: Vec<(String, String)>,
    fail: bool,
}

impl InMemoryMailer {
    /// Creates a new mailer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every send to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns (kind, recipient) pairs in delivery order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.read().unwrap().sent.clone()
    }

    fn record(&self, kind: &str, recipient: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(crate::error::Error::GatewayFailure(
                "smtp connection refused".into(),
            ));
        }
        state.sent.push((kind.to_string(), recipient.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send_order_confirmation(&self, _order: &Order, recipient: &str) -> Result<()> {
        self.record("order_confirmation", recipient)
    }

    async fn send_order_notification(&self, _order: &Order, recipient: &str) -> Result<()> {
        self.record("order_notification", recipient)
    }

    async fn send_recovery_email(&self, _checkout: &Checkout, recipient: &str) -> Result<()> {
        self.record("checkout_recovery", recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::{CheckoutId, SessionId};
    use domain::{CheckoutOwner, CurrencyCode};

    fn checkout() -> Checkout {
        Checkout::new(
            CheckoutId::new(),
            CheckoutOwner::Guest(SessionId::new("s1")),
            CurrencyCode::new("USD"),
            Utc::now() + Duration::hours(48),
        )
    }

    #[tokio::test]
    async fn pool_delivers_jobs() {
        let mailer = InMemoryMailer::new();
        let pool = NotificationPool::start(Arc::new(mailer.clone()), 2, 16);

        for _ in 0..3 {
            pool.dispatch(Notification::CheckoutRecovery {
                checkout: checkout(),
                recipient: "shopper@example.com".into(),
            });
        }
        pool.shutdown().await;

        let sent = mailer.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(kind, _)| kind == "checkout_recovery"));
    }

    #[tokio::test]
    async fn mailer_failure_does_not_propagate() {
        let mailer = InMemoryMailer::new();
        mailer.set_fail(true);
        let pool = NotificationPool::start(Arc::new(mailer.clone()), 1, 16);

        pool.dispatch(Notification::CheckoutRecovery {
            checkout: checkout(),
            recipient: "shopper@example.com".into(),
        });
        pool.shutdown().await;

        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let mailer = InMemoryMailer::new();
        let pool = NotificationPool::start(Arc::new(mailer.clone()), 1, 1);

        for _ in 0..50 {
            pool.dispatch(Notification::CheckoutRecovery {
                checkout: checkout(),
                recipient: "shopper@example.com".into(),
            });
        }
        pool.shutdown().await;

        // Some were delivered, the overflow was dropped, and dispatch never
        // blocked this task.
        assert!(mailer.sent().len() <= 50);
    }
}
