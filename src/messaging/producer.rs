use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::KafkaConfig;
use crate::cqrs::EventMetadata;
use crate::errors::{ServiceError, ServiceResult};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
use super::EventPublisher;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka producer shared by every publishing use case.
pub struct KafkaPublisher {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.broker)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()?;

        let circuit_breaker = CircuitBreaker::new(
            "kafka_producer",
            CircuitBreakerConfig {
                failure_threshold: 5,
                timeout: Duration::from_secs(30),
                success_threshold: 3,
            },
        );

        Ok(Self {
            producer,
            circuit_breaker,
            metrics,
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    /// Wait for in-flight deliveries before the process exits.
    pub fn flush(&self, timeout: Duration) -> anyhow::Result<()> {
        self.producer.flush(Timeout::After(timeout))?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        metadata: &EventMetadata,
        payload: String,
    ) -> ServiceResult<()> {
        let event_id = metadata.event_id.to_string();

        let result = self
            .circuit_breaker
            .call(async {
                let headers = OwnedHeaders::new()
                    .insert(Header {
                        key: "event_type",
                        value: Some(metadata.event_type),
                    })
                    .insert(Header {
                        key: "event_id",
                        value: Some(event_id.as_str()),
                    });

                let record = FutureRecord::to(topic)
                    .key(key)
                    .payload(&payload)
                    .headers(headers);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| e)
            })
            .await;

        self.metrics
            .set_circuit_state(self.circuit_breaker.name(), self.circuit_breaker.state().await);

        match result {
            Ok(_) => {
                self.metrics.record_published(topic);
                tracing::info!(
                    topic = %topic,
                    key = %key,
                    event_type = metadata.event_type,
                    event_id = %event_id,
                    "📤 Published event"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %topic, key = %key, "Circuit breaker open - broker unavailable");
                Err(ServiceError::Bus(format!("circuit open, {} not published", topic)))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(topic = %topic, key = %key, error = %e, "❌ Failed to publish event");
                Err(ServiceError::bus(topic, e))
            }
        }
    }
}
