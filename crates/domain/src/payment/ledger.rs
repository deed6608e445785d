//! Derived view over an order's payment transactions.

use super::{PaymentError, PaymentTransaction, TransactionKind, TransactionStatus};

/// A read view over the ordered transaction sequence of one order.
///
/// All derived sums consider Successful transactions only; Pending and
/// Failed rows exist for audit but never move money.
#[derive(Debug, Clone, Copy)]
pub struct Ledger<'a> {
    transactions: &'a [PaymentTransaction],
}

impl<'a> Ledger<'a> {
    /// Wraps an order's transaction sequence.
    pub fn new(transactions: &'a [PaymentTransaction]) -> Self {
        Self { transactions }
    }

    /// Returns the underlying transactions.
    pub fn transactions(&self) -> &'a [PaymentTransaction] {
        self.transactions
    }

    /// Sum of successful captures in minor units.
    pub fn captured_total(&self) -> i64 {
        self.successful_total(TransactionKind::Capture)
    }

    /// Sum of successful refunds in minor units.
    pub fn refunded_total(&self) -> i64 {
        self.successful_total(TransactionKind::Refund)
    }

    /// Amount still capturable against the order's final amount.
    pub fn remaining_capturable(&self, final_amount: i64) -> i64 {
        (final_amount - self.captured_total()).max(0)
    }

    /// Amount still refundable against the order's final amount.
    pub fn remaining_refundable(&self, final_amount: i64) -> i64 {
        (final_amount - self.refunded_total()).max(0)
    }

    /// Validates a capture amount: positive and within the final amount.
    pub fn check_capture(&self, amount: i64, final_amount: i64) -> Result<(), PaymentError> {
        if amount <= 0 || amount > final_amount {
            return Err(PaymentError::InvalidAmount {
                amount,
                final_amount,
            });
        }
        Ok(())
    }

    /// Validates a refund amount against the running refund total.
    pub fn check_refund(&self, amount: i64, final_amount: i64) -> Result<(), PaymentError> {
        if amount <= 0 || amount > final_amount {
            return Err(PaymentError::InvalidAmount {
                amount,
                final_amount,
            });
        }
        let available = self.remaining_refundable(final_amount);
        if amount > available {
            return Err(PaymentError::RefundExceedsAvailable {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    fn successful_total(&self, kind: TransactionKind) -> i64 {
        self.transactions
            .iter()
            .filter(|t| t.kind() == kind && t.status() == TransactionStatus::Successful)
            .map(|t| t.amount().minor_units())
            .sum()
    }
}
