//! Transfer Database Layer
//!
//! Movements live in `transfer_moviment`. Writes only happen inside a
//! [`TransferTx`], which owns one pooled connection until it is committed,
//! rolled back or dropped.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::error::TransferError;
use super::types::{ResolvedLeg, Transfer, TransferStatus, TransferType};
use crate::db::ConnectionManager;

/// Entry point to transfer storage
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Server-generated correlation id (`uuid_generate_v4()`)
    async fn transaction_uuid(&self) -> Result<Uuid, TransferError>;

    async fn begin(&self) -> Result<Box<dyn TransferTx>, TransferError>;

    async fn get(&self, id: i64) -> Result<Option<Transfer>, TransferError>;

    async fn health_check(&self) -> Result<(), TransferError>;
}

/// One open relational transaction
///
/// Dropping it without `commit` rolls it back.
#[async_trait]
pub trait TransferTx: Send {
    /// Insert the movement and return the generated id.
    async fn insert(&mut self, transfer: &Transfer) -> Result<i64, TransferError>;

    /// Number of rows touched
    async fn update_status(&mut self, id: i64, status: TransferStatus)
    -> Result<u64, TransferError>;

    async fn commit(self: Box<Self>) -> Result<(), TransferError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransferError>;
}

pub struct PgTransferStore {
    db: ConnectionManager,
}

impl PgTransferStore {
    pub fn new(db: ConnectionManager) -> Self {
        Self { db }
    }

    fn row_to_transfer(row: &PgRow) -> Result<Transfer, TransferError> {
        let type_charge: String = row.try_get("type_charge")?;
        let transfer_type = TransferType::from_str(&type_charge)
            .map_err(|_| TransferError::Database(format!("unknown type_charge {}", type_charge)))?;
        let status_str: String = row.try_get("status")?;
        let status = TransferStatus::parse(&status_str)
            .ok_or_else(|| TransferError::Database(format!("unknown status {}", status_str)))?;

        let from = ResolvedLeg {
            account_id: row.try_get("account_id_from")?,
            fk_account_id: row.try_get("fk_account_id_from")?,
        };
        let currency: String = row.try_get("currency")?;
        let amount: Decimal = row.try_get("amount")?;
        let transaction_id: Uuid = row.try_get("transaction_id")?;
        let transfer_at: DateTime<Utc> = row.try_get("transfer_at")?;

        let mut transfer = match transfer_type {
            TransferType::Transfer => {
                let to = ResolvedLeg {
                    account_id: row.try_get("account_id_to")?,
                    fk_account_id: row.try_get("fk_account_id_to")?,
                };
                Transfer::between(
                    from,
                    to,
                    &currency,
                    amount,
                    transaction_id,
                    status,
                    transfer_at,
                )
            }
            single => Transfer::single_account(
                single,
                from,
                &currency,
                amount,
                transaction_id,
                status,
                transfer_at,
            ),
        };
        transfer.id = Some(row.try_get("id")?);
        Ok(transfer)
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    async fn transaction_uuid(&self) -> Result<Uuid, TransferError> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT uuid_generate_v4()")
            .fetch_one(self.db.pool())
            .await?;
        Ok(id)
    }

    async fn begin(&self) -> Result<Box<dyn TransferTx>, TransferError> {
        let tx = self.db.start_transaction().await?;
        Ok(Box::new(PgTransferTx { tx }))
    }

    async fn get(&self, id: i64) -> Result<Option<Transfer>, TransferError> {
        let row = sqlx::query(
            r#"
            SELECT id, fk_account_id_from, account_id_from, fk_account_id_to, account_id_to,
                   type_charge, status, transfer_at, currency, amount, transaction_id
            FROM transfer_moviment
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    async fn health_check(&self) -> Result<(), TransferError> {
        self.db.health_check().await?;
        Ok(())
    }
}

struct PgTransferTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransferTx for PgTransferTx {
    async fn insert(&mut self, transfer: &Transfer) -> Result<i64, TransferError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transfer_moviment
                (fk_account_id_from, account_id_from, fk_account_id_to, account_id_to,
                 type_charge, status, transfer_at, currency, amount, transaction_id)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(transfer.account_from.fk_account_id)
        .bind(&transfer.account_from.account_id)
        .bind(transfer.account_to.fk_account_id)
        .bind(&transfer.account_to.account_id)
        .bind(transfer.transfer_type.as_str())
        .bind(transfer.status.as_str())
        .bind(transfer.transfer_at)
        .bind(&transfer.currency)
        .bind(transfer.amount)
        .bind(transfer.transaction_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn update_status(
        &mut self,
        id: i64,
        status: TransferStatus,
    ) -> Result<u64, TransferError> {
        let result = sqlx::query("UPDATE transfer_moviment SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
