//! Payment transactions and the append-only ledger.

mod ledger;
mod transaction;

pub use ledger::Ledger;
pub use transaction::{PaymentTransaction, TransactionKind, TransactionStatus};

use thiserror::Error;

/// Errors from ledger amount checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// Amount must be positive and must not exceed the order's final amount.
    #[error("invalid amount {amount}: must be > 0 and <= the order final amount {final_amount}")]
    InvalidAmount { amount: i64, final_amount: i64 },

    /// The running refund total would exceed the refundable amount.
    #[error("refund of {requested} exceeds the remaining refundable amount {available}")]
    RefundExceedsAvailable { requested: i64, available: i64 },
}
