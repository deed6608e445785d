//! Payment transaction records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{OrderId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// The kind of a payment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Funds authorized with the gateway.
    Authorize,
    /// Authorized funds captured.
    Capture,
    /// A pending authorization voided.
    Cancel,
    /// Captured or authorized funds returned.
    Refund,
}

impl TransactionKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Authorize => "Authorize",
            TransactionKind::Capture => "Capture",
            TransactionKind::Cancel => "Cancel",
            TransactionKind::Refund => "Refund",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome recorded for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Awaiting an external outcome (e.g. a redirect flow).
    Pending,
    /// The gateway confirmed the operation.
    Successful,
    /// The gateway rejected the operation or the call failed.
    Failed,
}

impl TransactionStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Successful => "Successful",
            TransactionStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of an order's payment ledger.
///
/// Append-only: once created, only `status` and `metadata` may change;
/// the kind and amount are immutable, so a failed operation is recorded
/// as a new row rather than an edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    id: TransactionId,
    order_id: OrderId,
    external_id: Option<String>,
    kind: TransactionKind,
    status: TransactionStatus,
    amount: Money,
    provider: String,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Creates a new transaction row.
    pub fn new(
        order_id: OrderId,
        kind: TransactionKind,
        status: TransactionStatus,
        amount: Money,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            order_id,
            external_id: None,
            kind,
            status,
            amount,
            provider: provider.into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attaches the gateway's transaction reference.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the transaction id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the order this transaction belongs to.
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Returns the gateway's transaction reference, if assigned.
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Returns the transaction kind.
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Returns the recorded outcome.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Returns the transaction amount.
    pub fn amount(&self) -> &Money {
        &self.amount
    }

    /// Returns the payment provider.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the metadata map.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Returns when the transaction was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Updates the recorded outcome (e.g. Pending -> Successful).
    pub fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }

    /// Inserts a metadata entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }
}
