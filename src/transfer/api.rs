//! Transfer request/response DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::error::TransferError;
use super::types::{Transfer, TransferStatus};

/// Inbound movement request
///
/// `type_charge` stays a raw string: an exact-match check against
/// `"TRANSFER"` is part of the business rules, not of decoding.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct TransferRequest {
    #[validate(length(min = 1, message = "account_id_from is required"))]
    #[schema(example = "ACC-001")]
    pub account_id_from: String,

    #[serde(default)]
    #[schema(example = "ACC-002")]
    pub account_id_to: Option<String>,

    #[serde(default)]
    #[schema(example = "TRANSFER")]
    pub type_charge: String,

    #[schema(example = "USD")]
    pub currency: String,

    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
}

impl TransferRequest {
    /// Shape check run before any resource is touched.
    pub fn check(&self) -> Result<(), TransferError> {
        self.validate()
            .map_err(|e| TransferError::InvalidRequest(e.to_string()))
    }

    pub fn destination(&self) -> Option<&str> {
        self.account_id_to.as_deref().filter(|id| !id.is_empty())
    }
}

/// Outcome of a saga, returned to the caller
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferResponse {
    pub id: i64,
    pub transaction_id: String,
    pub status: TransferStatus,
    /// Topic the event went to; absent for sagas that publish nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub transfer: Transfer,
}
