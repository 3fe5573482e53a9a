//! Transfer Error Types
//!
//! One taxonomy for every saga. Abort-path failures are logged, never
//! surfaced through these variants.

use thiserror::Error;

use crate::publisher::PublishError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Account or transfer not found")]
    NotFound,

    // === Business Rule Errors ===
    #[error("Transfer type is not valid for this operation")]
    TransInvalid,

    #[error("Amount sign does not match the transfer type")]
    AmountInvalid,

    #[error("Currency code is not valid")]
    CurrencyInvalid,

    #[error("Insufficient funds in source account")]
    Overdraft,

    // === Upstream Errors ===
    #[error("Account service rejected the credential")]
    Unauthorized,

    #[error("Account service refused access")]
    Forbidden,

    #[error("Account service error: {0}")]
    ServerError(String),

    // === Storage / Broker Errors ===
    #[error("Status update affected no rows")]
    UpdateFailed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Request deadline exceeded")]
    DeadlineExceeded,
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
            TransferError::NotFound => "NOT_FOUND",
            TransferError::TransInvalid => "TRANS_INVALID",
            TransferError::AmountInvalid => "AMOUNT_INVALID",
            TransferError::CurrencyInvalid => "CURRENCY_INVALID",
            TransferError::Overdraft => "OVERDRAFT",
            TransferError::Unauthorized => "UPSTREAM_UNAUTHORIZED",
            TransferError::Forbidden => "UPSTREAM_FORBIDDEN",
            TransferError::ServerError(_) => "SERVER_ERROR",
            TransferError::UpdateFailed => "UPDATE_FAILED",
            TransferError::Database(_) => "DATABASE_ERROR",
            TransferError::Broker(_) => "BROKER_ERROR",
            TransferError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    /// Get HTTP status code suggestion
    ///
    /// Upstream 401/403 are the service's own credential problem, not the
    /// caller's, so they surface as 500.
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidRequest(_) => 400,
            TransferError::NotFound => 404,
            TransferError::TransInvalid
            | TransferError::AmountInvalid
            | TransferError::CurrencyInvalid
            | TransferError::Overdraft => 409,
            TransferError::Unauthorized
            | TransferError::Forbidden
            | TransferError::ServerError(_)
            | TransferError::UpdateFailed
            | TransferError::Database(_)
            | TransferError::Broker(_)
            | TransferError::DeadlineExceeded => 500,
        }
    }

    /// Maps a non-2xx account-service status to its error kind.
    pub fn from_upstream_status(status: u16) -> Self {
        match status {
            401 => TransferError::Unauthorized,
            403 => TransferError::Forbidden,
            404 => TransferError::NotFound,
            other => TransferError::ServerError(format!("upstream status {}", other)),
        }
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::Database(e.to_string())
    }
}

impl From<PublishError> for TransferError {
    fn from(e: PublishError) -> Self {
        TransferError::Broker(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::AmountInvalid.code(), "AMOUNT_INVALID");
        assert_eq!(TransferError::TransInvalid.code(), "TRANS_INVALID");
        assert_eq!(TransferError::UpdateFailed.code(), "UPDATE_FAILED");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidRequest("x".into()).http_status(), 400);
        assert_eq!(TransferError::NotFound.http_status(), 404);
        assert_eq!(TransferError::TransInvalid.http_status(), 409);
        assert_eq!(TransferError::AmountInvalid.http_status(), 409);
        assert_eq!(TransferError::CurrencyInvalid.http_status(), 409);
        assert_eq!(TransferError::Overdraft.http_status(), 409);
        assert_eq!(TransferError::Unauthorized.http_status(), 500);
        assert_eq!(TransferError::ServerError("boom".into()).http_status(), 500);
    }

    #[test]
    fn test_upstream_status_mapping() {
        assert_eq!(
            TransferError::from_upstream_status(401),
            TransferError::Unauthorized
        );
        assert_eq!(TransferError::from_upstream_status(403), TransferError::Forbidden);
        assert_eq!(TransferError::from_upstream_status(404), TransferError::NotFound);
        assert!(matches!(
            TransferError::from_upstream_status(502),
            TransferError::ServerError(_)
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransferError::Overdraft.to_string(),
            "Insufficient funds in source account"
        );
    }
}
