//! Event Publishers
//!
//! Two backends, chosen once at startup:
//! - [`EventPublisher::Transactional`]: begin/publish/commit/abort, interleaved
//!   with the relational transaction by the orchestrator.
//! - [`EventPublisher::FireAndForget`]: publish only. The orchestrator commits
//!   the row first and publishes once afterwards.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod pool;
#[cfg(feature = "sqs")]
pub mod sqs;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{QueueBackend, QueueConfig};
use crate::transfer::types::Event;

/// Header carrying the partition key
pub const HEADER_ACCOUNT: &str = "account";
/// Header carrying the per-publish request id
pub const HEADER_REQUEST_ID: &str = "request_id";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(String),

    #[error("Failed to begin broker transaction: {0}")]
    Begin(String),

    #[error("Failed to publish to {topic}: {reason}")]
    Send { topic: String, reason: String },

    #[error("Failed to commit broker transaction: {0}")]
    Commit(String),

    #[error("Failed to abort broker transaction: {0}")]
    Abort(String),

    #[error("Broker setup failed: {0}")]
    Setup(String),

    #[error("Queue backend '{0}' is not compiled in (enable the cargo feature)")]
    BackendDisabled(&'static str),
}

/// Wire form of one event
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Partition key, also sent as the `account` header
    pub key: String,
    /// Fresh per publish, sent as the `request_id` header
    pub request_id: Uuid,
    /// Deduplication id for queues that need one (the transfer id)
    pub dedup_id: String,
    /// JSON-encoded [`Event`]
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn from_event(event: &Event, dedup_id: impl Into<String>) -> Result<Self, PublishError> {
        let payload = serde_json::to_vec(event).map_err(|e| PublishError::Encode(e.to_string()))?;
        Ok(Self {
            topic: event.event_type.clone(),
            key: event.key.clone(),
            request_id: Uuid::new_v4(),
            dedup_id: dedup_id.into(),
            payload,
        })
    }
}

/// Broker that can group publishes into a transaction
#[async_trait]
pub trait TransactionalBroker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a transaction. A producer holds at most one open transaction, so
    /// this may wait for a free producer; callers bound the wait.
    async fn begin(&self) -> Result<Box<dyn BrokerTransaction>, PublishError>;
}

/// One open broker transaction
///
/// Dropping an unfinished transaction must abort it.
#[async_trait]
pub trait BrokerTransaction: Send {
    async fn publish(&mut self, message: OutboundMessage) -> Result<(), PublishError>;

    async fn commit(self: Box<Self>) -> Result<(), PublishError>;

    async fn abort(self: Box<Self>) -> Result<(), PublishError>;
}

/// Queue with no cross-resource transaction support
#[async_trait]
pub trait FireAndForgetQueue: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError>;
}

#[derive(Clone)]
pub enum EventPublisher {
    Transactional(Arc<dyn TransactionalBroker>),
    FireAndForget(Arc<dyn FireAndForgetQueue>),
}

impl EventPublisher {
    pub fn name(&self) -> &'static str {
        match self {
            EventPublisher::Transactional(b) => b.name(),
            EventPublisher::FireAndForget(q) => q.name(),
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, EventPublisher::Transactional(_))
    }

    /// Build the backend selected by `queue.backend`.
    pub async fn from_config(queue: &QueueConfig) -> Result<Self, PublishError> {
        match queue.backend {
            QueueBackend::Kafka => {
                #[cfg(feature = "kafka")]
                {
                    let broker = kafka::KafkaBroker::connect(&queue.kafka).await?;
                    Ok(EventPublisher::Transactional(Arc::new(broker)))
                }
                #[cfg(not(feature = "kafka"))]
                {
                    Err(PublishError::BackendDisabled("kafka"))
                }
            }
            QueueBackend::Sqs => {
                #[cfg(feature = "sqs")]
                {
                    let queue = sqs::SqsQueue::connect(&queue.sqs).await?;
                    Ok(EventPublisher::FireAndForget(Arc::new(queue)))
                }
                #[cfg(not(feature = "sqs"))]
                {
                    Err(PublishError::BackendDisabled("sqs"))
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockBroker;
    use super::*;
    use crate::transfer::types::{ResolvedLeg, Transfer, TransferStatus};
    use chrono::Utc;

    fn sample_event() -> Event {
        let transfer = Transfer::between(
            ResolvedLeg {
                account_id: "A1".to_string(),
                fk_account_id: 1,
            },
            ResolvedLeg {
                account_id: "A2".to_string(),
                fk_account_id: 2,
            },
            "USD",
            "100.00".parse().unwrap(),
            Uuid::new_v4(),
            TransferStatus::TransferEventCreated,
            Utc::now(),
        );
        Event::new("topic.transfer", transfer, Utc::now())
    }

    #[test]
    fn test_outbound_message_from_event() {
        let event = sample_event();
        let a = OutboundMessage::from_event(&event, "42").unwrap();
        let b = OutboundMessage::from_event(&event, "42").unwrap();

        assert_eq!(a.topic, "topic.transfer");
        assert_eq!(a.key, "A1:A2");
        assert_eq!(a.dedup_id, "42");
        assert_ne!(a.request_id, b.request_id);

        let decoded: Event = serde_json::from_slice(&a.payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn test_mock_broker_hides_aborted_messages() {
        let broker = MockBroker::new();
        let message = OutboundMessage::from_event(&sample_event(), "1").unwrap();

        let mut tx = broker.begin().await.unwrap();
        tx.publish(message.clone()).await.unwrap();
        tx.abort().await.unwrap();
        assert!(broker.committed().is_empty());

        let mut tx = broker.begin().await.unwrap();
        tx.publish(message).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(broker.committed().len(), 1);
        assert_eq!(broker.abort_count(), 1);
    }

    #[cfg(not(feature = "kafka"))]
    #[tokio::test]
    async fn test_disabled_backend_is_reported() {
        let queue = QueueConfig {
            backend: QueueBackend::Kafka,
            topics: Default::default(),
            kafka: Default::default(),
            sqs: Default::default(),
        };
        assert_eq!(
            EventPublisher::from_config(&queue).await.err(),
            Some(PublishError::BackendDisabled("kafka"))
        );
    }
}
