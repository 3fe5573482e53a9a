//! Transfer Orchestrator
//!
//! Drives one saga per request over two resources: the relational
//! transaction and, for event sagas, the broker transaction.
//!
//! Side effects are strictly ordered:
//!
//! ```text
//! uuid → begin DB → [begin broker] → rules + account lookups → insert
//!      → build event → publish → status *_SCHEDULE → commit broker → commit DB
//! ```
//!
//! Any error after the DB transaction is open runs the abort sequence
//! (abort broker, roll back DB, both log-only) and returns the original error.
//! The broker commits first so a committed row always has its event; an event
//! whose row then fails to commit is logged at error level.
//!
//! One deadline, fixed when the request arrives, bounds everything up to the
//! commits: uuid, DB begin, broker begin (which may queue for a free
//! producer) and the steps. Each saga runs inside a `saga` span carrying its
//! `transaction_id`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::api::{TransferRequest, TransferResponse};
use super::db::{TransferStore, TransferTx};
use super::error::TransferError;
use super::state::SagaState;
use super::types::{Event, ResolvedLeg, Transfer, TransferStatus, TransferType, is_valid_currency};
use crate::account::AccountService;
use crate::config::TopicConfig;
use crate::logging::saga_span;
use crate::publisher::{BrokerTransaction, EventPublisher, OutboundMessage};

/// Logs every state change of one saga
struct SagaTracker {
    operation: &'static str,
    transaction_id: Uuid,
    state: SagaState,
}

impl SagaTracker {
    fn new(operation: &'static str, transaction_id: Uuid) -> Self {
        Self {
            operation,
            transaction_id,
            state: SagaState::Idle,
        }
    }

    fn advance(&mut self, next: SagaState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal saga transition {} -> {}",
            self.state,
            next
        );
        if next.is_terminal() {
            info!(
                operation = self.operation,
                transaction_id = %self.transaction_id,
                from = %self.state,
                state = %next,
                "Saga finished"
            );
        } else {
            debug!(
                operation = self.operation,
                transaction_id = %self.transaction_id,
                from = %self.state,
                state = %next,
                "Saga transition"
            );
        }
        self.state = next;
    }
}

/// How a non-event saga resolves accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FundMode {
    /// `GET /get/{id}` lookups, status `TRANSFER-REST-DONE`
    Rest,
    /// `GET /fundBalanceAccount/{id}` lookups with an overdraft check, status `TRANSFER-DONE`
    Synchronous,
}

/// Business rules that need no remote call.
fn evaluate_rules(transfer_type: TransferType, req: &TransferRequest) -> Result<(), TransferError> {
    match transfer_type {
        TransferType::Transfer => {
            if req.type_charge != TransferType::Transfer.as_str() {
                return Err(TransferError::TransInvalid);
            }
            match req.destination() {
                Some(to) if to != req.account_id_from => {}
                _ => return Err(TransferError::TransInvalid),
            }
            if req.amount <= Decimal::ZERO {
                return Err(TransferError::AmountInvalid);
            }
        }
        TransferType::Credit => {
            if req.amount < Decimal::ZERO {
                return Err(TransferError::AmountInvalid);
            }
        }
        TransferType::Debit => {
            if req.amount > Decimal::ZERO {
                return Err(TransferError::AmountInvalid);
            }
        }
    }
    if !is_valid_currency(&req.currency) {
        return Err(TransferError::CurrencyInvalid);
    }
    Ok(())
}

fn event_created_status(transfer_type: TransferType) -> TransferStatus {
    match transfer_type {
        TransferType::Credit => TransferStatus::CreditEventCreated,
        TransferType::Debit => TransferStatus::DebitEventCreated,
        TransferType::Transfer => TransferStatus::TransferEventCreated,
    }
}

fn operation_name(transfer_type: TransferType) -> &'static str {
    match transfer_type {
        TransferType::Credit => "credit_transfer_event",
        TransferType::Debit => "debit_transfer_event",
        TransferType::Transfer => "add_transfer_event",
    }
}

pub struct TransferOrchestrator {
    store: Arc<dyn TransferStore>,
    accounts: Arc<dyn AccountService>,
    publisher: EventPublisher,
    topics: TopicConfig,
    deadline: Duration,
}

impl TransferOrchestrator {
    pub fn new(
        store: Arc<dyn TransferStore>,
        accounts: Arc<dyn AccountService>,
        publisher: EventPublisher,
        topics: TopicConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            accounts,
            publisher,
            topics,
            deadline,
        }
    }

    pub fn publisher_name(&self) -> &'static str {
        self.publisher.name()
    }

    /// Credit one account (amount ≥ 0), event on the credit topic.
    pub async fn credit_transfer_event(
        &self,
        req: TransferRequest,
    ) -> Result<TransferResponse, TransferError> {
        self.run_event_saga(TransferType::Credit, req).await
    }

    /// Debit one account (amount ≤ 0), event on the debit topic.
    pub async fn debit_transfer_event(
        &self,
        req: TransferRequest,
    ) -> Result<TransferResponse, TransferError> {
        self.run_event_saga(TransferType::Debit, req).await
    }

    /// Account-to-account movement, event on the transfer topic keyed `"{from}:{to}"`.
    pub async fn add_transfer_event(
        &self,
        req: TransferRequest,
    ) -> Result<TransferResponse, TransferError> {
        self.run_event_saga(TransferType::Transfer, req).await
    }

    /// Record the movement and have the account service move the funds.
    pub async fn add_transfer(&self, req: TransferRequest) -> Result<TransferResponse, TransferError> {
        self.run_fund_saga(FundMode::Rest, req).await
    }

    /// Balance-checked transfer executed synchronously by the account service.
    ///
    /// The overdraft check is advisory: no lock is held between reading the
    /// balance and the account service applying the move.
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferResponse, TransferError> {
        self.run_fund_saga(FundMode::Synchronous, req).await
    }

    pub async fn get_transfer(&self, id: i64) -> Result<Transfer, TransferError> {
        self.store.get(id).await?.ok_or(TransferError::NotFound)
    }

    fn topic_for(&self, transfer_type: TransferType) -> &str {
        match transfer_type {
            TransferType::Credit => &self.topics.credit,
            TransferType::Debit => &self.topics.debit,
            TransferType::Transfer => &self.topics.transfer,
        }
    }

    /// Deadline for a saga starting now
    fn deadline_from_now(&self) -> Instant {
        Instant::now() + self.deadline
    }

    async fn within_deadline<T>(
        &self,
        deadline: Instant,
        steps: impl Future<Output = Result<T, TransferError>>,
    ) -> Result<T, TransferError> {
        timeout_at(deadline, steps).await.unwrap_or_else(|_| {
            warn!(deadline_secs = self.deadline.as_secs(), "Saga deadline exceeded");
            Err(TransferError::DeadlineExceeded)
        })
    }

    async fn resolve_account(
        &self,
        account_id: &str,
        transaction_id: Uuid,
    ) -> Result<ResolvedLeg, TransferError> {
        let account = self.accounts.get_account(account_id, transaction_id).await?;
        Ok(ResolvedLeg {
            account_id: account_id.to_string(),
            fk_account_id: account.id,
        })
    }

    /// Resolve accounts and assemble the movement, lookups in source-then-destination order.
    async fn build_transfer(
        &self,
        transfer_type: TransferType,
        req: &TransferRequest,
        transaction_id: Uuid,
        status: TransferStatus,
    ) -> Result<Transfer, TransferError> {
        let from = self
            .resolve_account(&req.account_id_from, transaction_id)
            .await?;
        let now = Utc::now();
        match transfer_type {
            TransferType::Transfer => {
                let to_id = req.destination().ok_or(TransferError::TransInvalid)?;
                let to = self.resolve_account(to_id, transaction_id).await?;
                Ok(Transfer::between(
                    from,
                    to,
                    &req.currency,
                    req.amount,
                    transaction_id,
                    status,
                    now,
                ))
            }
            single => Ok(Transfer::single_account(
                single,
                from,
                &req.currency,
                req.amount,
                transaction_id,
                status,
                now,
            )),
        }
    }

    /// Abort sequence. Failures here are logged, never returned.
    async fn abort(
        &self,
        saga: &mut SagaTracker,
        broker_tx: Option<Box<dyn BrokerTransaction>>,
        db_tx: Box<dyn TransferTx>,
        cause: &TransferError,
    ) {
        saga.advance(SagaState::Aborting);
        warn!(
            operation = saga.operation,
            transaction_id = %saga.transaction_id,
            error = %cause,
            "Aborting saga"
        );
        if let Some(tx) = broker_tx
            && let Err(e) = tx.abort().await
        {
            warn!(transaction_id = %saga.transaction_id, error = %e, "Broker abort failed");
        }
        if let Err(e) = db_tx.rollback().await {
            warn!(transaction_id = %saga.transaction_id, error = %e, "Relational rollback failed");
        }
        saga.advance(SagaState::Aborted);
    }

    async fn run_event_saga(
        &self,
        transfer_type: TransferType,
        req: TransferRequest,
    ) -> Result<TransferResponse, TransferError> {
        req.check()?;
        let deadline = self.deadline_from_now();
        let transaction_id = self
            .within_deadline(deadline, self.store.transaction_uuid())
            .await?;
        let operation = operation_name(transfer_type);
        self.event_saga(transfer_type, req, transaction_id, deadline)
            .instrument(saga_span(operation, transaction_id))
            .await
    }

    /// Every wait up to the commits, broker begin included, is bounded by `deadline`.
    async fn event_saga(
        &self,
        transfer_type: TransferType,
        req: TransferRequest,
        transaction_id: Uuid,
        deadline: Instant,
    ) -> Result<TransferResponse, TransferError> {
        let mut saga = SagaTracker::new(operation_name(transfer_type), transaction_id);

        let mut db_tx = self.within_deadline(deadline, self.store.begin()).await?;
        saga.advance(SagaState::DbTxOpen);

        let mut broker_tx = None;
        if let EventPublisher::Transactional(broker) = &self.publisher {
            let begin = async { broker.begin().await.map_err(TransferError::from) };
            match self.within_deadline(deadline, begin).await {
                Ok(tx) => {
                    broker_tx = Some(tx);
                    saga.advance(SagaState::BrokerTxOpen);
                }
                Err(err) => {
                    self.abort(&mut saga, None, db_tx, &err).await;
                    return Err(err);
                }
            }
        }

        let steps = self.event_steps(
            &mut saga,
            transfer_type,
            &req,
            transaction_id,
            &mut *db_tx,
            broker_tx.as_mut(),
        );
        let (transfer, message) = match self.within_deadline(deadline, steps).await {
            Ok(done) => done,
            Err(e) => {
                self.abort(&mut saga, broker_tx, db_tx, &e).await;
                return Err(e);
            }
        };
        let transfer_id = transfer.id.unwrap_or_default();

        match broker_tx {
            Some(tx) => {
                if let Err(e) = tx.commit().await {
                    let err = TransferError::from(e);
                    self.abort(&mut saga, None, db_tx, &err).await;
                    return Err(err);
                }
                if let Err(e) = db_tx.commit().await {
                    error!(
                        transfer_id,
                        transaction_id = %transaction_id,
                        error = %e,
                        "Event committed to broker but relational commit failed"
                    );
                    saga.advance(SagaState::Aborting);
                    saga.advance(SagaState::Aborted);
                    return Err(e);
                }
                saga.advance(SagaState::Committed);
            }
            None => {
                self.commit_relational(&mut saga, db_tx).await?;
                if let EventPublisher::FireAndForget(queue) = &self.publisher
                    && let Err(e) = queue.publish(message).await
                {
                    error!(
                        transfer_id,
                        transaction_id = %transaction_id,
                        queue = queue.name(),
                        error = %e,
                        "Row committed but event publish failed; needs reconciliation"
                    );
                    return Err(e.into());
                }
            }
        }

        info!(
            transfer_id,
            transaction_id = %transaction_id,
            status = %transfer.status,
            "Transfer event scheduled"
        );
        Ok(TransferResponse {
            id: transfer_id,
            transaction_id: transaction_id.to_string(),
            status: transfer.status,
            topic: Some(self.topic_for(transfer_type).to_string()),
            transfer,
        })
    }

    /// Rules through status update; both transactions stay open.
    ///
    /// Returns the persisted transfer (with its scheduled status) and the
    /// message that was published, or is still to be published when there is
    /// no broker transaction.
    async fn event_steps(
        &self,
        saga: &mut SagaTracker,
        transfer_type: TransferType,
        req: &TransferRequest,
        transaction_id: Uuid,
        db_tx: &mut dyn TransferTx,
        broker_tx: Option<&mut Box<dyn BrokerTransaction>>,
    ) -> Result<(Transfer, OutboundMessage), TransferError> {
        evaluate_rules(transfer_type, req)?;
        let mut transfer = self
            .build_transfer(
                transfer_type,
                req,
                transaction_id,
                event_created_status(transfer_type),
            )
            .await?;
        saga.advance(SagaState::RulesEvaluated);

        let id = db_tx.insert(&transfer).await?;
        transfer.id = Some(id);
        saga.advance(SagaState::Persisted);

        // The event carries the row as inserted, before the status update
        let event = Event::new(self.topic_for(transfer_type), transfer.clone(), Utc::now());
        let message = OutboundMessage::from_event(&event, id.to_string())?;
        if let Some(tx) = broker_tx {
            tx.publish(message.clone()).await?;
            saga.advance(SagaState::Published);
        }

        let scheduled = transfer.status.scheduled();
        if db_tx.update_status(id, scheduled).await? == 0 {
            return Err(TransferError::UpdateFailed);
        }
        transfer.status = scheduled;
        Ok((transfer, message))
    }

    async fn run_fund_saga(
        &self,
        mode: FundMode,
        req: TransferRequest,
    ) -> Result<TransferResponse, TransferError> {
        req.check()?;
        let deadline = self.deadline_from_now();
        let transaction_id = self
            .within_deadline(deadline, self.store.transaction_uuid())
            .await?;
        let operation = match mode {
            FundMode::Rest => "add_transfer",
            FundMode::Synchronous => "transfer",
        };
        self.fund_saga(operation, mode, req, transaction_id, deadline)
            .instrument(saga_span(operation, transaction_id))
            .await
    }

    async fn fund_saga(
        &self,
        operation: &'static str,
        mode: FundMode,
        req: TransferRequest,
        transaction_id: Uuid,
        deadline: Instant,
    ) -> Result<TransferResponse, TransferError> {
        let mut saga = SagaTracker::new(operation, transaction_id);

        let mut db_tx = self.within_deadline(deadline, self.store.begin()).await?;
        saga.advance(SagaState::DbTxOpen);

        let steps = self.fund_steps(&mut saga, mode, &req, transaction_id, &mut *db_tx);
        let transfer = match self.within_deadline(deadline, steps).await {
            Ok(transfer) => transfer,
            Err(e) => {
                self.abort(&mut saga, None, db_tx, &e).await;
                return Err(e);
            }
        };

        self.commit_relational(&mut saga, db_tx).await?;

        let transfer_id = transfer.id.unwrap_or_default();
        info!(
            transfer_id,
            transaction_id = %transaction_id,
            status = %transfer.status,
            "Transfer completed"
        );
        Ok(TransferResponse {
            id: transfer_id,
            transaction_id: transaction_id.to_string(),
            status: transfer.status,
            topic: None,
            transfer,
        })
    }

    async fn fund_steps(
        &self,
        saga: &mut SagaTracker,
        mode: FundMode,
        req: &TransferRequest,
        transaction_id: Uuid,
        db_tx: &mut dyn TransferTx,
    ) -> Result<Transfer, TransferError> {
        evaluate_rules(TransferType::Transfer, req)?;
        let mut transfer = match mode {
            FundMode::Rest => {
                self.build_transfer(
                    TransferType::Transfer,
                    req,
                    transaction_id,
                    TransferStatus::TransferRestDone,
                )
                .await?
            }
            FundMode::Synchronous => self.balance_checked_transfer(req, transaction_id).await?,
        };
        saga.advance(SagaState::RulesEvaluated);

        transfer.id = Some(db_tx.insert(&transfer).await?);
        saga.advance(SagaState::Persisted);

        self.accounts
            .transfer_fund(&transfer, transaction_id)
            .await?;
        Ok(transfer)
    }

    async fn balance_checked_transfer(
        &self,
        req: &TransferRequest,
        transaction_id: Uuid,
    ) -> Result<Transfer, TransferError> {
        let to_id = req.destination().ok_or(TransferError::TransInvalid)?;
        let from = self
            .accounts
            .get_fund_balance(&req.account_id_from, transaction_id)
            .await?;
        let to = self.accounts.get_fund_balance(to_id, transaction_id).await?;

        if from.amount < req.amount {
            debug!(
                account_id = %req.account_id_from,
                available = %from.amount,
                requested = %req.amount,
                "Overdraft"
            );
            return Err(TransferError::Overdraft);
        }

        Ok(Transfer::between(
            ResolvedLeg {
                account_id: req.account_id_from.clone(),
                fk_account_id: from.fk_account_id,
            },
            ResolvedLeg {
                account_id: to_id.to_string(),
                fk_account_id: to.fk_account_id,
            },
            &req.currency,
            req.amount,
            transaction_id,
            TransferStatus::TransferDone,
            Utc::now(),
        ))
    }

    async fn commit_relational(
        &self,
        saga: &mut SagaTracker,
        db_tx: Box<dyn TransferTx>,
    ) -> Result<(), TransferError> {
        if let Err(e) = db_tx.commit().await {
            error!(
                transaction_id = %saga.transaction_id,
                error = %e,
                "Relational commit failed"
            );
            saga.advance(SagaState::Aborting);
            saga.advance(SagaState::Aborted);
            return Err(e);
        }
        saga.advance(SagaState::Committed);
        Ok(())
    }
}
