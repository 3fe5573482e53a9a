//! SQS FIFO queue (fire-and-forget)
//!
//! The partition key becomes `MessageGroupId`, the transfer id
//! `MessageDeduplicationId`.

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use tracing::info;

use super::{FireAndForgetQueue, HEADER_ACCOUNT, HEADER_REQUEST_ID, OutboundMessage, PublishError};
use crate::config::SqsConfig;

pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub async fn connect(config: &SqsConfig) -> Result<Self, PublishError> {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        info!(queue_url = %config.queue_url, region = %config.region, "SQS publisher ready");
        Ok(Self {
            client: Client::new(&shared),
            queue_url: config.queue_url.clone(),
        })
    }
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue, PublishError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| PublishError::Encode(e.to_string()))
}

#[async_trait]
impl FireAndForgetQueue for SqsQueue {
    fn name(&self) -> &'static str {
        "sqs"
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        let body =
            String::from_utf8(message.payload).map_err(|e| PublishError::Encode(e.to_string()))?;

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .message_group_id(&message.key)
            .message_deduplication_id(&message.dedup_id)
            .message_attributes(HEADER_ACCOUNT, string_attribute(&message.key)?)
            .message_attributes(
                HEADER_REQUEST_ID,
                string_attribute(&message.request_id.to_string())?,
            )
            .send()
            .await
            .map(|_| ())
            .map_err(|e| PublishError::Send {
                topic: message.topic,
                reason: DisplayErrorContext(&e).to_string(),
            })
    }
}
