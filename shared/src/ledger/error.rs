//! Ledger error taxonomy

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by ledger rules
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Insufficient stock for {subject}: requested {requested}, available {available}")]
    InsufficientStock {
        subject: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Document locked: {0}")]
    DocumentLocked(String),

    /// Network or database hiccup; the caller may retry
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn insufficient(subject: impl Into<String>, requested: Decimal, available: Decimal) -> Self {
        LedgerError::InsufficientStock {
            subject: subject.into(),
            requested,
            available,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
