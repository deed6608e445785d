//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order through payment and fulfilment.
///
/// Status transitions:
/// ```text
/// Pending ───────► PendingAction
///    │  │               │  │
///    │  └───► Paid ◄────┘  │
///    │         │           │
///    │         ├──► Captured ──┬──► Shipped ──► Delivered
///    │         ├──► Shipped    └──► Refunded
///    │         └──► Refunded
///    └──► Cancelled ◄──────────(also from PendingAction)
/// ```
///
/// Terminal states: `Delivered`, `Cancelled`, `Refunded`. The table is
/// closed; anything not listed is an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created, awaiting payment.
    #[default]
    Pending,

    /// Payment started but needs shopper action (e.g. a 3-D Secure redirect).
    PendingAction,

    /// Payment authorized.
    Paid,

    /// Authorized funds captured (fully or partially).
    Captured,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal).
    Delivered,

    /// Cancelled before payment completed (terminal).
    Cancelled,

    /// Fully refunded (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, PendingAction)
                | (Pending, Paid)
                | (Pending, Cancelled)
                | (PendingAction, Paid)
                | (PendingAction, Cancelled)
                | (Paid, Captured)
                | (Paid, Shipped)
                | (Paid, Refunded)
                | (Captured, Shipped)
                | (Captured, Refunded)
                | (Shipped, Delivered)
        )
    }

    /// Returns true once payment has been authorized or completed.
    pub fn indicates_payment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Captured | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::PendingAction => "PendingAction",
            OrderStatus::Paid => "Paid",
            OrderStatus::Captured => "Captured",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
