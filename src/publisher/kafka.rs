//! Kafka transactional producers
//!
//! `acks=all` + idempotence. librdkafka allows one open transaction per
//! producer, so the broker keeps `producers` of them, each fenced under its
//! own `transactional.id` (`{transactional_id}-{n}`), and lends one per saga.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use super::pool::{Lease, Pool};
use super::{
    BrokerTransaction, HEADER_ACCOUNT, HEADER_REQUEST_ID, OutboundMessage, PublishError,
    TransactionalBroker,
};
use crate::config::KafkaConfig;

const TX_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaBroker {
    producers: Pool<FutureProducer>,
}

impl KafkaBroker {
    /// `transactional.id` of the `index`-th producer
    pub fn transactional_id(config: &KafkaConfig, index: usize) -> String {
        format!("{}-{}", config.transactional_id, index)
    }

    pub fn client_config(config: &KafkaConfig, transactional_id: &str) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", config.brokers.join(","))
            .set("client.id", &config.client_id)
            .set("security.protocol", &config.protocol)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("transactional.id", transactional_id)
            .set("message.timeout.ms", SEND_TIMEOUT.as_millis().to_string());
        if !config.username.is_empty() {
            client
                .set("sasl.mechanisms", &config.mechanism)
                .set("sasl.username", &config.username)
                .set("sasl.password", &config.password);
        }
        client
    }

    /// Create the producers and fence any previous instances holding the
    /// same transactional ids.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, PublishError> {
        let mut producers = Vec::with_capacity(config.producers);
        for index in 0..config.producers {
            let transactional_id = Self::transactional_id(config, index);
            let producer: FutureProducer = Self::client_config(config, &transactional_id)
                .create()
                .map_err(|e| PublishError::Setup(e.to_string()))?;

            let init = producer.clone();
            tokio::task::spawn_blocking(move || init.init_transactions(TX_TIMEOUT))
                .await
                .map_err(|e| PublishError::Setup(e.to_string()))?
                .map_err(|e| PublishError::Setup(format!("{}: {}", transactional_id, e)))?;
            debug!(transactional_id = %transactional_id, "Kafka producer initialized");
            producers.push(producer);
        }

        info!(
            brokers = %config.brokers.join(","),
            transactional_id = %config.transactional_id,
            producers = config.producers,
            "Kafka transactional producers ready"
        );
        Ok(Self {
            producers: Pool::new(producers),
        })
    }
}

#[async_trait]
impl TransactionalBroker for KafkaBroker {
    fn name(&self) -> &'static str {
        "kafka"
    }

    /// Waits for a free producer when all are in a transaction.
    async fn begin(&self) -> Result<Box<dyn BrokerTransaction>, PublishError> {
        let producer = self.producers.checkout().await?;
        producer
            .begin_transaction()
            .map_err(|e| PublishError::Begin(e.to_string()))?;
        Ok(Box::new(KafkaTransaction {
            producer: Some(producer),
        }))
    }
}

struct KafkaTransaction {
    /// Back to the pool once commit/abort returns; `None` once finished
    producer: Option<Lease<FutureProducer>>,
}

impl KafkaTransaction {
    async fn finish(&mut self, commit: bool) -> Result<(), PublishError> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };
        let result = tokio::task::spawn_blocking(move || {
            if commit {
                producer.commit_transaction(TX_TIMEOUT).map_err(|e| {
                    // A failed commit leaves the transaction open
                    if let Err(abort) = producer.abort_transaction(TX_TIMEOUT) {
                        warn!(error = %abort, "Abort after failed commit also failed");
                    }
                    PublishError::Commit(e.to_string())
                })
            } else {
                producer
                    .abort_transaction(TX_TIMEOUT)
                    .map_err(|e| PublishError::Abort(e.to_string()))
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(e) if commit => Err(PublishError::Commit(e.to_string())),
            Err(e) => Err(PublishError::Abort(e.to_string())),
        }
    }

    fn producer(&self) -> Result<&FutureProducer, PublishError> {
        self.producer
            .as_deref()
            .ok_or_else(|| PublishError::Begin("transaction already finished".to_string()))
    }
}

#[async_trait]
impl BrokerTransaction for KafkaTransaction {
    async fn publish(&mut self, message: OutboundMessage) -> Result<(), PublishError> {
        let request_id = message.request_id.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: HEADER_ACCOUNT,
                value: Some(message.key.as_str()),
            })
            .insert(Header {
                key: HEADER_REQUEST_ID,
                value: Some(request_id.as_str()),
            });
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        self.producer()?
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map(|_| ())
            .map_err(|(e, _)| PublishError::Send {
                topic: message.topic.clone(),
                reason: e.to_string(),
            })
    }

    async fn commit(self: Box<Self>) -> Result<(), PublishError> {
        let mut this = self;
        this.finish(true).await
    }

    async fn abort(self: Box<Self>) -> Result<(), PublishError> {
        let mut this = self;
        this.finish(false).await
    }
}

impl Drop for KafkaTransaction {
    fn drop(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn_blocking(move || {
                if let Err(e) = producer.abort_transaction(TX_TIMEOUT) {
                    warn!(error = %e, "Abort of dropped Kafka transaction failed");
                }
            });
        }
    }
}
