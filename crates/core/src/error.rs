//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Client-input failures (`NotFound`, `DuplicateSku`, `InvalidMagnitude`,
/// `InsufficientStock`, `Validation`) are detected before any mutation is
/// attempted. `Unavailable` and `Internal` are storage faults; an operation that
/// fails with one of them has not happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The referenced product (or its ledger) does not exist.
    #[error("not found")]
    NotFound,

    /// Another live product already uses this SKU.
    #[error("sku already exists: {0}")]
    DuplicateSku(String),

    /// Movement quantities must be strictly positive.
    #[error("movement magnitude must be positive (got {0})")]
    InvalidMagnitude(i64),

    /// A withdrawal would drive the derived balance negative.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// A catalog field failed validation (e.g. blank name, oversized SKU).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The storage layer could not be reached (pool closed, IO failure).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Unexpected storage or engine fault.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Transport-neutral classification of a [`LedgerError`].
///
/// An outer layer maps these onto its own status codes (e.g. HTTP 404 / 409 /
/// 422 / 503 / 500).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unprocessable,
    Unavailable,
    Internal,
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound => ErrorKind::NotFound,
            LedgerError::DuplicateSku(_) | LedgerError::InsufficientStock { .. } => {
                ErrorKind::Conflict
            }
            LedgerError::InvalidMagnitude(_) | LedgerError::Validation(_) => {
                ErrorKind::Unprocessable
            }
            LedgerError::Unavailable(_) => ErrorKind::Unavailable,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the caller's input caused the failure (never worth retrying as-is).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::Unprocessable
        )
    }
}
