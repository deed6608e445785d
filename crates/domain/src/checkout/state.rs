//! Checkout status machine.

use serde::{Deserialize, Serialize};

/// The status of a checkout in its lifecycle.
///
/// Status transitions:
/// ```text
/// Active ──┬──► Completed
///          ├──► Abandoned
///          └──► Expired
/// ```
///
/// All three destinations are terminal; there is no transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutStatus {
    /// The basket is open and mutable.
    #[default]
    Active,

    /// The checkout was converted into an order (terminal).
    Completed,

    /// The shopper walked away and the basket was reclaimed (terminal).
    Abandoned,

    /// The checkout passed its expiry deadline (terminal).
    Expired,
}

impl CheckoutStatus {
    /// Returns true if the checkout can still be mutated.
    pub fn can_modify(&self) -> bool {
        matches!(self, CheckoutStatus::Active)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !self.can_modify()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Active => "Active",
            CheckoutStatus::Completed => "Completed",
            CheckoutStatus::Abandoned => "Abandoned",
            CheckoutStatus::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
