//! Integration Tests for the Transfer Saga
//!
//! Whole sagas against in-memory store, account service and publishers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::account::{Account, AccountBalance, AccountService, MockAccountService};
use crate::config::TopicConfig;
use crate::publisher::{BrokerTransaction, EventPublisher, PublishError, TransactionalBroker};
use crate::publisher::mock::{MockBroker, MockQueue};
use crate::transfer::api::TransferRequest;
use crate::transfer::coordinator::TransferOrchestrator;
use crate::transfer::db::mock::InMemoryTransferStore;
use crate::transfer::error::TransferError;
use crate::transfer::types::{Event, LegDirection, Transfer, TransferStatus, TransferType};

const DEADLINE: Duration = Duration::from_secs(60);

struct TestHarness {
    orchestrator: TransferOrchestrator,
    store: InMemoryTransferStore,
    accounts: Arc<MockAccountService>,
    broker: Arc<MockBroker>,
    queue: Arc<MockQueue>,
}

impl TestHarness {
    fn accounts() -> MockAccountService {
        MockAccountService::new()
            .with_account("A1", 11, "500.00")
            .with_account("A2", 22, "0")
    }

    fn transactional() -> Self {
        let broker = Arc::new(MockBroker::new());
        Self::build(EventPublisher::Transactional(broker.clone()), broker, Arc::new(MockQueue::new()))
    }

    fn fire_and_forget() -> Self {
        let queue = Arc::new(MockQueue::new());
        Self::build(EventPublisher::FireAndForget(queue.clone()), Arc::new(MockBroker::new()), queue)
    }

    fn build(publisher: EventPublisher, broker: Arc<MockBroker>, queue: Arc<MockQueue>) -> Self {
        let store = InMemoryTransferStore::new();
        let accounts = Arc::new(Self::accounts());
        let orchestrator = TransferOrchestrator::new(
            Arc::new(store.clone()),
            accounts.clone(),
            publisher,
            TopicConfig::default(),
            DEADLINE,
        );
        Self {
            orchestrator,
            store,
            accounts,
            broker,
            queue,
        }
    }

    fn assert_nothing_written(&self) {
        assert!(self.store.committed().is_empty(), "no row expected");
        assert!(self.broker.committed().is_empty(), "no event expected");
        assert!(self.queue.sent().is_empty(), "no queued event expected");
        assert_eq!(self.store.open_transactions(), 0);
    }
}

fn single(account: &str, amount: &str) -> TransferRequest {
    TransferRequest {
        account_id_from: account.to_string(),
        account_id_to: None,
        type_charge: String::new(),
        currency: "USD".to_string(),
        amount: amount.parse().unwrap(),
    }
}

fn transfer(from: &str, to: &str, amount: &str) -> TransferRequest {
    TransferRequest {
        account_id_from: from.to_string(),
        account_id_to: Some(to.to_string()),
        type_charge: "TRANSFER".to_string(),
        currency: "USD".to_string(),
        amount: amount.parse().unwrap(),
    }
}

fn decode(payload: &[u8]) -> Event {
    serde_json::from_slice(payload).unwrap()
}

// ========================================================================
// Business rule failures
// ========================================================================

#[tokio::test]
async fn test_credit_with_negative_amount_writes_nothing() {
    let h = TestHarness::transactional();

    let result = h.orchestrator.credit_transfer_event(single("A1", "-10")).await;

    assert_eq!(result.unwrap_err(), TransferError::AmountInvalid);
    h.assert_nothing_written();
    assert_eq!(h.store.rollback_count(), 1);
    assert_eq!(h.broker.abort_count(), 1);
}

#[tokio::test]
async fn test_debit_with_positive_amount_writes_nothing() {
    let h = TestHarness::transactional();

    let result = h.orchestrator.debit_transfer_event(single("A1", "10")).await;

    assert_eq!(result.unwrap_err(), TransferError::AmountInvalid);
    h.assert_nothing_written();
}

#[tokio::test]
async fn test_transfer_type_is_case_sensitive() {
    let h = TestHarness::transactional();
    let mut req = transfer("A1", "A2", "100.00");
    req.type_charge = "transfer".to_string();

    let result = h.orchestrator.add_transfer_event(req).await;

    assert_eq!(result.unwrap_err(), TransferError::TransInvalid);
    h.assert_nothing_written();
    assert!(h.accounts.calls().is_empty(), "rules run before lookups");
}

#[tokio::test]
async fn test_unknown_account_aborts() {
    let h = TestHarness::transactional();

    let result = h.orchestrator.credit_transfer_event(single("NOPE", "10")).await;

    assert_eq!(result.unwrap_err(), TransferError::NotFound);
    h.assert_nothing_written();
}

#[tokio::test]
async fn test_upstream_forbidden_is_reported() {
    let h = TestHarness::transactional();
    h.accounts.fail_account("A2", 403);

    let result = h
        .orchestrator
        .add_transfer_event(transfer("A1", "A2", "100.00"))
        .await;

    assert_eq!(result.unwrap_err(), TransferError::Forbidden);
    assert_eq!(h.accounts.calls(), vec!["get:A1", "get:A2"]);
    h.assert_nothing_written();
}

// ========================================================================
// Happy paths (transactional broker)
// ========================================================================

#[tokio::test]
async fn test_credit_event_persists_and_publishes_once() {
    let h = TestHarness::transactional();

    let resp = h
        .orchestrator
        .credit_transfer_event(single("A1", "25.50"))
        .await
        .unwrap();

    let rows = h.store.committed();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransferStatus::CreditSchedule);
    assert_eq!(rows[0].account_from.fk_account_id, 11);
    assert_eq!(rows[0].account_to, rows[0].account_from);

    let events = h.broker.committed();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, "topic.credit");
    assert_eq!(events[0].key, "A1");

    let event = decode(&events[0].payload);
    assert_eq!(event.event_data.transfer.id, rows[0].id);
    assert_eq!(event.event_data.transfer.status, TransferStatus::CreditEventCreated);

    assert_eq!(Some(resp.id), rows[0].id);
    assert_eq!(resp.status, TransferStatus::CreditSchedule);
    assert_eq!(resp.topic.as_deref(), Some("topic.credit"));
    assert_eq!(h.broker.commit_count(), 1);
    assert_eq!(h.store.commit_count(), 1);
}

#[tokio::test]
async fn test_debit_event_uses_debit_topic() {
    let h = TestHarness::transactional();

    h.orchestrator
        .debit_transfer_event(single("A2", "-5"))
        .await
        .unwrap();

    let rows = h.store.committed();
    assert_eq!(rows[0].status, TransferStatus::DebitSchedule);
    assert_eq!(rows[0].account_from.direction, LegDirection::Debit);
    assert_eq!(h.broker.committed()[0].topic, "topic.debit");
}

#[tokio::test]
async fn test_transfer_event_a1_to_a2() {
    let h = TestHarness::transactional();

    h.orchestrator
        .add_transfer_event(transfer("A1", "A2", "100.00"))
        .await
        .unwrap();

    let events = h.broker.committed();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, "topic.transfer");
    assert_eq!(events[0].key, "A1:A2");

    let event = decode(&events[0].payload);
    let t: &Transfer = &event.event_data.transfer;
    assert_eq!(event.key, "A1:A2");
    assert_eq!(t.status, TransferStatus::TransferEventCreated);
    assert_eq!(t.transfer_type, TransferType::Transfer);
    assert_eq!(t.account_from.amount, "-100.00".parse().unwrap());
    assert_eq!(t.account_to.amount, "100.00".parse().unwrap());
    assert_eq!(t.account_from.transaction_id, t.account_to.transaction_id);

    assert_eq!(h.store.committed()[0].status, TransferStatus::TransferSchedule);
    assert_eq!(h.accounts.calls(), vec!["get:A1", "get:A2"]);
}

#[tokio::test]
async fn test_get_transfer_after_saga() {
    let h = TestHarness::transactional();

    let resp = h
        .orchestrator
        .credit_transfer_event(single("A1", "1"))
        .await
        .unwrap();

    let stored = h.orchestrator.get_transfer(resp.id).await.unwrap();
    assert_eq!(stored.transaction_id.to_string(), resp.transaction_id);
    assert_eq!(
        h.orchestrator.get_transfer(resp.id + 1).await.unwrap_err(),
        TransferError::NotFound
    );
}

// ========================================================================
// Resource failures (transactional broker)
// ========================================================================

#[tokio::test]
async fn test_publish_failure_rolls_back_row() {
    let h = TestHarness::transactional();
    h.broker.set_fail_publish(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert!(matches!(result, Err(TransferError::Broker(_))));
    h.assert_nothing_written();
    assert_eq!(h.store.rollback_count(), 1);
    assert_eq!(h.broker.abort_count(), 1);
}

#[tokio::test]
async fn test_broker_begin_failure_rolls_back() {
    let h = TestHarness::transactional();
    h.broker.set_fail_begin(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert!(matches!(result, Err(TransferError::Broker(_))));
    h.assert_nothing_written();
    assert!(h.accounts.calls().is_empty());
}

#[tokio::test]
async fn test_zero_row_update_fails_saga() {
    let h = TestHarness::transactional();
    h.store.set_zero_row_update(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert_eq!(result.unwrap_err(), TransferError::UpdateFailed);
    h.assert_nothing_written();
    assert_eq!(h.broker.abort_count(), 1);
}

#[tokio::test]
async fn test_broker_commit_failure_rolls_back_row() {
    let h = TestHarness::transactional();
    h.broker.set_fail_commit(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert!(matches!(result, Err(TransferError::Broker(_))));
    h.assert_nothing_written();
    assert_eq!(h.store.rollback_count(), 1);
}

#[tokio::test]
async fn test_relational_commit_failure_after_broker_commit() {
    let h = TestHarness::transactional();
    h.store.set_fail_commit(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert!(matches!(result, Err(TransferError::Database(_))));
    assert!(h.store.committed().is_empty());
    // At-least-once: the event is already out
    assert_eq!(h.broker.committed().len(), 1);
}

#[tokio::test]
async fn test_uuid_failure_opens_nothing() {
    let h = TestHarness::transactional();
    h.store.set_fail_uuid(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert!(matches!(result, Err(TransferError::Database(_))));
    assert_eq!(h.broker.begin_count(), 0);
    assert_eq!(h.store.rollback_count(), 0);
}

#[tokio::test]
async fn test_invalid_request_opens_nothing() {
    let h = TestHarness::transactional();

    let result = h.orchestrator.credit_transfer_event(single("", "10")).await;

    assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
    assert_eq!(h.broker.begin_count(), 0);
}

// ========================================================================
// Fire-and-forget queue
// ========================================================================

#[tokio::test]
async fn test_fire_and_forget_publishes_after_commit() {
    let h = TestHarness::fire_and_forget();

    let resp = h
        .orchestrator
        .add_transfer_event(transfer("A1", "A2", "10"))
        .await
        .unwrap();

    assert_eq!(h.store.committed().len(), 1);
    let sent = h.queue.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key, "A1:A2");
    assert_eq!(sent[0].dedup_id, resp.id.to_string());
    assert_eq!(h.broker.begin_count(), 0);
}

#[tokio::test]
async fn test_fire_and_forget_publish_failure_keeps_row() {
    let h = TestHarness::fire_and_forget();
    h.queue.set_fail_publish(true);

    let result = h.orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert!(matches!(result, Err(TransferError::Broker(_))));
    let rows = h.store.committed();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransferStatus::CreditSchedule);
    assert!(h.queue.sent().is_empty());
}

#[tokio::test]
async fn test_fire_and_forget_rule_failure_sends_nothing() {
    let h = TestHarness::fire_and_forget();

    let result = h.orchestrator.debit_transfer_event(single("A1", "3")).await;

    assert_eq!(result.unwrap_err(), TransferError::AmountInvalid);
    h.assert_nothing_written();
}

// ========================================================================
// REST and synchronous transfers
// ========================================================================

#[tokio::test]
async fn test_add_transfer_records_and_moves_funds() {
    let h = TestHarness::transactional();

    let resp = h
        .orchestrator
        .add_transfer(transfer("A1", "A2", "50"))
        .await
        .unwrap();

    assert_eq!(resp.status, TransferStatus::TransferRestDone);
    assert!(resp.topic.is_none());
    assert_eq!(h.store.committed().len(), 1);
    assert_eq!(h.accounts.funded().len(), 1);
    assert_eq!(h.accounts.funded()[0].id, Some(resp.id));
    assert_eq!(
        h.accounts.calls(),
        vec![
            "get:A1".to_string(),
            "get:A2".to_string(),
            format!("fund:{}", resp.transaction_id)
        ]
    );
    assert_eq!(h.broker.begin_count(), 0);
}

#[tokio::test]
async fn test_add_transfer_upstream_unauthorized_rolls_back() {
    let h = TestHarness::transactional();
    h.accounts.fail_transfer_fund(401);

    let result = h.orchestrator.add_transfer(transfer("A1", "A2", "50")).await;

    assert_eq!(result.unwrap_err(), TransferError::Unauthorized);
    h.assert_nothing_written();
}

#[tokio::test]
async fn test_transfer_overdraft() {
    let h = TestHarness::transactional();

    let result = h.orchestrator.transfer(transfer("A1", "A2", "500.01")).await;

    assert_eq!(result.unwrap_err(), TransferError::Overdraft);
    h.assert_nothing_written();
    assert!(h.accounts.funded().is_empty());
}

#[tokio::test]
async fn test_transfer_with_exact_balance() {
    let h = TestHarness::transactional();

    let resp = h
        .orchestrator
        .transfer(transfer("A1", "A2", "500.00"))
        .await
        .unwrap();

    assert_eq!(resp.status, TransferStatus::TransferDone);
    assert_eq!(resp.transfer.account_from.fk_account_id, 11);
    assert_eq!(resp.transfer.account_to.fk_account_id, 22);
    assert_eq!(h.accounts.calls()[..2], ["balance:A1", "balance:A2"]);
    assert_eq!(h.store.committed()[0].status, TransferStatus::TransferDone);
}

// ========================================================================
// Deadline
// ========================================================================

/// Account service that never answers in time
struct SlowAccounts;

#[async_trait]
impl AccountService for SlowAccounts {
    async fn get_account(&self, account_id: &str, _: Uuid) -> Result<Account, TransferError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(Account {
            id: 1,
            account_id: account_id.to_string(),
            person_id: None,
            tenant_id: None,
        })
    }

    async fn get_fund_balance(&self, _: &str, _: Uuid) -> Result<AccountBalance, TransferError> {
        Err(TransferError::ServerError("unused".to_string()))
    }

    async fn transfer_fund(&self, _: &Transfer, _: Uuid) -> Result<(), TransferError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_aborts_both_resources() {
    let store = InMemoryTransferStore::new();
    let broker = Arc::new(MockBroker::new());
    let orchestrator = TransferOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(SlowAccounts),
        EventPublisher::Transactional(broker.clone()),
        TopicConfig::default(),
        Duration::from_secs(1),
    );

    let result = orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert_eq!(result.unwrap_err(), TransferError::DeadlineExceeded);
    assert!(store.committed().is_empty());
    assert_eq!(store.open_transactions(), 0);
    assert_eq!(broker.abort_count(), 1);
    assert!(broker.committed().is_empty());
}

/// Broker whose `begin` blocks while the test holds the gate
struct GatedBroker {
    gate: Arc<AsyncMutex<()>>,
    inner: MockBroker,
}

impl GatedBroker {
    fn new() -> Self {
        Self {
            gate: Arc::new(AsyncMutex::new(())),
            inner: MockBroker::new(),
        }
    }

    async fn close(&self) -> OwnedMutexGuard<()> {
        self.gate.clone().lock_owned().await
    }
}

#[async_trait]
impl TransactionalBroker for GatedBroker {
    fn name(&self) -> &'static str {
        "gated-broker"
    }

    async fn begin(&self) -> Result<Box<dyn BrokerTransaction>, PublishError> {
        let _open = self.gate.lock().await;
        self.inner.begin().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_broker_begin() {
    let store = InMemoryTransferStore::new();
    let broker = Arc::new(GatedBroker::new());
    let orchestrator = TransferOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(TestHarness::accounts()),
        EventPublisher::Transactional(broker.clone()),
        TopicConfig::default(),
        Duration::from_secs(1),
    );
    let _held = broker.close().await;

    let result = orchestrator.credit_transfer_event(single("A1", "10")).await;

    assert_eq!(result.unwrap_err(), TransferError::DeadlineExceeded);
    assert_eq!(store.open_transactions(), 0);
    assert_eq!(store.rollback_count(), 1);
    assert!(store.committed().is_empty());
    assert_eq!(broker.inner.begin_count(), 0);
    assert!(broker.inner.committed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_saga_proceeds_once_broker_frees_up() {
    let store = InMemoryTransferStore::new();
    let broker = Arc::new(GatedBroker::new());
    let orchestrator = Arc::new(TransferOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(TestHarness::accounts()),
        EventPublisher::Transactional(broker.clone()),
        TopicConfig::default(),
        Duration::from_secs(10),
    ));
    let held = broker.close().await;

    let saga = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.credit_transfer_event(single("A1", "10")).await })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!saga.is_finished());
    drop(held);

    assert!(saga.await.unwrap().is_ok());
    assert_eq!(store.committed().len(), 1);
    assert_eq!(broker.inner.commit_count(), 1);
}

#[tokio::test]
async fn test_concurrent_sagas_share_broker() {
    let h = TestHarness::transactional();

    let (credit, debit) = tokio::join!(
        h.orchestrator.credit_transfer_event(single("A1", "10")),
        h.orchestrator.debit_transfer_event(single("A1", "-5")),
    );

    assert!(credit.is_ok());
    assert!(debit.is_ok());
    assert_eq!(h.store.committed().len(), 2);
    assert_eq!(h.broker.committed().len(), 2);
    assert_eq!(h.store.open_transactions(), 0);
}
