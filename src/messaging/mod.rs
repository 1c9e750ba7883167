use async_trait::async_trait;
use std::time::Duration;

use crate::cqrs::{EventMetadata, IntegrationEvent};
use crate::errors::{ServiceError, ServiceResult};

// ============================================================================
// Messaging - Kafka producer and consumer plumbing
// ============================================================================

pub mod consumer;
pub mod producer;

pub use consumer::{subscribe, DeliveryProgress, InboundMessage};
pub use producer::KafkaPublisher;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        metadata: &EventMetadata,
        payload: String,
    ) -> ServiceResult<()>;
}

/// Where consumed records come from and where progress is committed.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next record, `None` when nothing arrived within `timeout`.
    async fn poll(&self, timeout: Duration) -> ServiceResult<Option<InboundMessage>>;

    /// Mark `message` and everything before it on its partition as consumed.
    fn commit(&self, message: &InboundMessage) -> ServiceResult<()>;
}

/// Handles one consumed record. Called again on transient failure with the
/// same `progress`, so side effects that already succeeded can be skipped.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage, progress: &DeliveryProgress) -> ServiceResult<()>;
}

/// Encode and publish a typed event on its topic.
pub async fn publish_event<E: IntegrationEvent>(
    publisher: &dyn EventPublisher,
    event: &E,
) -> ServiceResult<()> {
    let payload = event
        .encode()
        .map_err(|e| ServiceError::bus("encode event", e))?;

    publisher
        .publish(E::TOPIC, &event.key(), &event.metadata(), payload)
        .await
}
