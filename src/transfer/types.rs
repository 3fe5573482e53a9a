//! Transfer Core Types
//!
//! A [`Transfer`] owns both of its legs outright; credit/debit-only
//! movements carry two identical but independent [`AccountStatement`]s.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Business type of a movement, persisted as `type_charge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferType {
    Transfer,
    Credit,
    Debit,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Transfer => "TRANSFER",
            TransferType::Credit => "CREDIT",
            TransferType::Debit => "DEBIT",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferType {
    type Err = ();

    /// Exact match only: `"transfer"` is not a transfer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER" => Ok(TransferType::Transfer),
            "CREDIT" => Ok(TransferType::Credit),
            "DEBIT" => Ok(TransferType::Debit),
            _ => Err(()),
        }
    }
}

/// Persisted progress of a movement
///
/// The hyphenated transfer spellings are part of the stored data and are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TransferStatus {
    #[serde(rename = "CREDIT_EVENT_CREATED")]
    CreditEventCreated,
    #[serde(rename = "CREDIT_SCHEDULE")]
    CreditSchedule,
    #[serde(rename = "DEBIT_EVENT_CREATED")]
    DebitEventCreated,
    #[serde(rename = "DEBIT_SCHEDULE")]
    DebitSchedule,
    #[serde(rename = "TRANSFER-EVENT-CREATED")]
    TransferEventCreated,
    #[serde(rename = "TRANSFER-SCHEDULE")]
    TransferSchedule,
    #[serde(rename = "TRANSFER-REST-DONE")]
    TransferRestDone,
    #[serde(rename = "TRANSFER-DONE")]
    TransferDone,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::CreditEventCreated => "CREDIT_EVENT_CREATED",
            TransferStatus::CreditSchedule => "CREDIT_SCHEDULE",
            TransferStatus::DebitEventCreated => "DEBIT_EVENT_CREATED",
            TransferStatus::DebitSchedule => "DEBIT_SCHEDULE",
            TransferStatus::TransferEventCreated => "TRANSFER-EVENT-CREATED",
            TransferStatus::TransferSchedule => "TRANSFER-SCHEDULE",
            TransferStatus::TransferRestDone => "TRANSFER-REST-DONE",
            TransferStatus::TransferDone => "TRANSFER-DONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREDIT_EVENT_CREATED" => Some(TransferStatus::CreditEventCreated),
            "CREDIT_SCHEDULE" => Some(TransferStatus::CreditSchedule),
            "DEBIT_EVENT_CREATED" => Some(TransferStatus::DebitEventCreated),
            "DEBIT_SCHEDULE" => Some(TransferStatus::DebitSchedule),
            "TRANSFER-EVENT-CREATED" => Some(TransferStatus::TransferEventCreated),
            "TRANSFER-SCHEDULE" => Some(TransferStatus::TransferSchedule),
            "TRANSFER-REST-DONE" => Some(TransferStatus::TransferRestDone),
            "TRANSFER-DONE" => Some(TransferStatus::TransferDone),
            _ => None,
        }
    }

    /// Status written once the event for this movement is in the broker.
    pub fn scheduled(&self) -> Self {
        match self {
            TransferStatus::CreditEventCreated => TransferStatus::CreditSchedule,
            TransferStatus::DebitEventCreated => TransferStatus::DebitSchedule,
            TransferStatus::TransferEventCreated => TransferStatus::TransferSchedule,
            other => *other,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegDirection {
    Debit,
    Credit,
}

/// One side of a movement, as seen by one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountStatement {
    /// Caller-facing account identifier
    pub account_id: String,
    /// Internal id resolved through the account service
    pub fk_account_id: i64,
    #[serde(rename = "type_charge")]
    pub direction: LegDirection,
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    pub currency: String,
    pub charged_at: DateTime<Utc>,
    pub transaction_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transfer {
    /// Assigned by storage on insert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub account_from: AccountStatement,
    pub account_to: AccountStatement,
    #[serde(rename = "type_charge")]
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub currency: String,
    #[schema(value_type = String, example = "100.00")]
    pub amount: Decimal,
    pub transaction_id: Uuid,
    pub transfer_at: DateTime<Utc>,
}

/// Caller-supplied data for a movement, after account resolution
#[derive(Debug, Clone)]
pub struct ResolvedLeg {
    pub account_id: String,
    pub fk_account_id: i64,
}

impl Transfer {
    /// Credit or debit against a single account.
    ///
    /// Both legs start equal and are owned separately, so changing one never
    /// touches the other.
    pub fn single_account(
        transfer_type: TransferType,
        account: ResolvedLeg,
        currency: &str,
        amount: Decimal,
        transaction_id: Uuid,
        status: TransferStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let direction = match transfer_type {
            TransferType::Debit => LegDirection::Debit,
            _ => LegDirection::Credit,
        };
        let leg = AccountStatement {
            account_id: account.account_id,
            fk_account_id: account.fk_account_id,
            direction,
            amount,
            currency: currency.to_string(),
            charged_at: now,
            transaction_id,
        };
        Self {
            id: None,
            account_to: leg.clone(),
            account_from: leg,
            transfer_type,
            status,
            currency: currency.to_string(),
            amount,
            transaction_id,
            transfer_at: now,
        }
    }

    /// Account-to-account movement: debit leg on the source (amount negated),
    /// credit leg on the destination, one shared transaction id.
    pub fn between(
        from: ResolvedLeg,
        to: ResolvedLeg,
        currency: &str,
        amount: Decimal,
        transaction_id: Uuid,
        status: TransferStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            account_from: AccountStatement {
                account_id: from.account_id,
                fk_account_id: from.fk_account_id,
                direction: LegDirection::Debit,
                amount: -amount,
                currency: currency.to_string(),
                charged_at: now,
                transaction_id,
            },
            account_to: AccountStatement {
                account_id: to.account_id,
                fk_account_id: to.fk_account_id,
                direction: LegDirection::Credit,
                amount,
                currency: currency.to_string(),
                charged_at: now,
                transaction_id,
            },
            transfer_type: TransferType::Transfer,
            status,
            currency: currency.to_string(),
            amount,
            transaction_id,
            transfer_at: now,
        }
    }

    /// Broker partition key: account pair for transfers, the account otherwise.
    pub fn partition_key(&self) -> String {
        match self.transfer_type {
            TransferType::Transfer => format!(
                "{}:{}",
                self.account_from.account_id, self.account_to.account_id
            ),
            TransferType::Credit | TransferType::Debit => self.account_from.account_id.clone(),
        }
    }
}

/// Wrapper published to the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub key: String,
    pub event_date: DateTime<Utc>,
    /// Topic name
    pub event_type: String,
    pub event_data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventData {
    pub transfer: Transfer,
}

impl Event {
    /// Snapshot of a persisted transfer. Consumes the snapshot; events are not edited.
    pub fn new(topic: &str, transfer: Transfer, now: DateTime<Utc>) -> Self {
        Self {
            key: transfer.partition_key(),
            event_date: now,
            event_type: topic.to_string(),
            event_data: EventData { transfer },
        }
    }
}

/// ISO-4217 shaped: three ASCII uppercase letters
pub fn is_valid_currency(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
