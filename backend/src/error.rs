//! Error handling for the stock ledger server
//!
//! Provides consistent error responses in English and Italian

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::ledger::LedgerError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_it: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Document locked: {0}")]
    DocumentLocked(String),

    #[error("Insufficient stock for {subject}")]
    InsufficientStock {
        subject: String,
        requested: Decimal,
        available: Decimal,
    },

    /// Serialization failure, deadlock or pool timeout; safe to retry
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_it: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<Decimal>,
}

impl ErrorDetail {
    pub fn new(code: &str, message_en: impl Into<String>, message_it: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_it: message_it.into(),
            field: None,
            requested: None,
            available: None,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotAuthenticated | AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConstraintViolation(_) | AppError::DocumentLocked(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::NotAuthenticated => ErrorDetail::new(
                "NOT_AUTHENTICATED",
                "Authentication required",
                "Autenticazione richiesta",
            ),
            AppError::InvalidToken(msg) => {
                ErrorDetail::new("INVALID_TOKEN", msg.clone(), "Token non valido")
            }
            AppError::PermissionDenied(msg) => ErrorDetail::new(
                "PERMISSION_DENIED",
                msg.clone(),
                "Non hai i permessi per eseguire questa operazione",
            ),
            AppError::Validation {
                field,
                message,
                message_it,
            } => ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_it.clone())
                .with_field(field),
            AppError::NotFound(resource) => ErrorDetail::new(
                "NOT_FOUND",
                format!("{} not found", resource),
                format!("{} non trovato", resource),
            ),
            AppError::ConstraintViolation(msg) => ErrorDetail::new(
                "CONSTRAINT_VIOLATION",
                msg.clone(),
                format!("Operazione non consentita: {}", msg),
            ),
            AppError::DocumentLocked(doc) => ErrorDetail::new(
                "DOCUMENT_LOCKED",
                format!("{} is finalized and can no longer be edited", doc),
                format!("{} è definitivo e non può essere modificato", doc),
            ),
            AppError::InsufficientStock {
                subject,
                requested,
                available,
            } => {
                let mut detail = ErrorDetail::new(
                    "INSUFFICIENT_STOCK",
                    format!(
                        "Insufficient stock for {}: requested {}, available {}",
                        subject, requested, available
                    ),
                    format!(
                        "Giacenza insufficiente per {}: richiesti {}, disponibili {}",
                        subject, requested, available
                    ),
                );
                detail.requested = Some(*requested);
                detail.available = Some(*available);
                detail
            }
            AppError::Transient(_) => ErrorDetail::new(
                "TRANSIENT",
                "The operation could not complete, please retry",
                "Operazione non completata, riprovare",
            ),
            AppError::DatabaseError(_) => ErrorDetail::new(
                "DATABASE_ERROR",
                "A database error occurred",
                "Errore del database",
            ),
            AppError::Internal(msg) => {
                ErrorDetail::new("INTERNAL_ERROR", msg.clone(), "Errore interno del server")
            }
            AppError::InternalError(_) => ErrorDetail::new(
                "INTERNAL_ERROR",
                "An internal server error occurred",
                "Errore interno del server",
            ),
        }
    }

    pub fn validation(field: &str, message: &str, message_it: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_it: message_it.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation { field, message } => AppError::Validation {
                field,
                message_it: format!("Valore non valido: {}", message),
                message,
            },
            LedgerError::InsufficientStock {
                subject,
                requested,
                available,
            } => AppError::InsufficientStock {
                subject,
                requested,
                available,
            },
            LedgerError::NotFound(what) => AppError::NotFound(what),
            LedgerError::ConstraintViolation(msg) => AppError::ConstraintViolation(msg),
            LedgerError::NotAuthenticated => AppError::NotAuthenticated,
            LedgerError::PermissionDenied(msg) => AppError::PermissionDenied(msg),
            LedgerError::DocumentLocked(doc) => AppError::DocumentLocked(doc),
            LedgerError::Transient(msg) => AppError::Transient(msg),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::PoolTimedOut => {
                return AppError::Transient("connection pool timed out".to_string())
            }
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };
        match code.as_deref() {
            Some("23503") => {
                AppError::ConstraintViolation("record is still referenced by other records".to_string())
            }
            Some("23505") => {
                AppError::ConstraintViolation("a record with this value already exists".to_string())
            }
            // check_violation, numeric_value_out_of_range
            Some("23514") | Some("22003") => AppError::validation(
                "quantity",
                "Value is outside the range the ledger can store",
                "Valore fuori dall'intervallo ammesso dal registro",
            ),
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => AppError::Transient(err.to_string()),
            _ => AppError::DatabaseError(err),
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
