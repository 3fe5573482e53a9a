//! Account service collaborator
//!
//! The sibling service owns balances. This crate only resolves external
//! account ids to internal keys, reads balances, and asks it to move funds.

pub mod client;

pub use client::RestAccountClient;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transfer::error::TransferError;
use crate::transfer::types::Transfer;

/// `GET /get/{id}` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Internal key, stored as the movement's foreign key
    pub id: i64,
    pub account_id: String,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// `GET /fundBalanceAccount/{id}` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    #[serde(default)]
    pub id: i64,
    pub account_id: String,
    pub fk_account_id: i64,
    #[serde(default)]
    pub currency: String,
    pub amount: Decimal,
}

/// Calls made on behalf of one saga. `request_id` is forwarded as `X-Request-Id`.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn get_account(&self, account_id: &str, request_id: Uuid)
    -> Result<Account, TransferError>;

    async fn get_fund_balance(
        &self,
        account_id: &str,
        request_id: Uuid,
    ) -> Result<AccountBalance, TransferError>;

    async fn transfer_fund(&self, transfer: &Transfer, request_id: Uuid)
    -> Result<(), TransferError>;
}


#[cfg(test)]
pub use mock::MockAccountService;
