//! Store error types.

use thiserror::Error;

/// Errors that can occur at the persistence boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No record with the given key.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A record with the given key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The write carried a stale version.
    #[error("concurrency conflict on {entity} {id}: expected version {expected}, actual {actual}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// The default currency cannot be deleted.
    #[error("cannot delete the default currency {code}")]
    DefaultCurrencyProtected { code: String },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
