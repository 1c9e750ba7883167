use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Message},
    Offset, TopicPartitionList,
};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::KafkaConfig;
use crate::errors::{ServiceError, ServiceResult};
use crate::utils::{retry_with_backoff, RetryConfig};
use super::MessageSource;

const SUBSCRIBE_ATTEMPTS: u32 = 5;

/// Owned copy of a consumed record, detached from the consumer's buffer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

impl InboundMessage {
    pub fn from_borrowed(message: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: message.topic().to_string(),
            key: message
                .key()
                .map(|raw| String::from_utf8_lossy(raw).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
        }
    }

    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Steps that already succeeded for the delivery being handled.
///
/// Lives for one delivery only; a broker redelivery starts from scratch.
#[derive(Debug, Default)]
pub struct DeliveryProgress {
    completed: Mutex<HashSet<&'static str>>,
}

impl DeliveryProgress {
    pub fn is_done(&self, step: &'static str) -> bool {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(step)
    }

    pub fn mark_done(&self, step: &'static str) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(step);
    }
}

/// Build the group consumer and subscribe to `topics`.
///
/// Offsets are committed by the consumer loop once a message is handled or
/// parked in the dead-letter table, never automatically.
pub async fn subscribe(config: &KafkaConfig, topics: &[&str]) -> anyhow::Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.broker)
        .set("group.id", &config.group_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "10000")
        .create()?;

    retry_with_backoff("kafka_subscribe", RetryConfig::connect(SUBSCRIBE_ATTEMPTS), |_| {
        let result = consumer.subscribe(topics);
        async move { result }
    })
    .await
    .into_result()?;

    tracing::info!(
        group_id = %config.group_id,
        topics = ?topics,
        "Subscribed to topics"
    );

    Ok(consumer)
}

#[async_trait]
impl MessageSource for StreamConsumer {
    async fn poll(&self, timeout: Duration) -> ServiceResult<Option<InboundMessage>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(message)) => Ok(Some(InboundMessage::from_borrowed(&message))),
            Ok(Err(e)) => Err(ServiceError::bus("receive", e)),
        }
    }

    fn commit(&self, message: &InboundMessage) -> ServiceResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| ServiceError::bus("build commit offsets", e))?;

        Consumer::commit(self, &offsets, CommitMode::Async).map_err(|e| ServiceError::bus("commit offset", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_progress_tracks_steps() {
        let progress = DeliveryProgress::default();
        assert!(!progress.is_done("payment_command"));

        progress.mark_done("payment_command");
        assert!(progress.is_done("payment_command"));
        assert!(!progress.is_done("view"));
    }
}
