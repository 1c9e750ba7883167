use actix::Recipient;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::messaging::{DeliveryProgress, InboundMessage, MessageHandler, MessageSource};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};
use super::AddToDlq;

// ============================================================================
// Event Consumer - broker read loop
// ============================================================================
//
// One message at a time:
//   poll (bounded by poll timeout) → handle with transient retries
//     → on final failure park in DLQ → commit offset
//
// Cancellation is only observed between messages, so an in-flight message
// is always finished and committed before the loop exits.
//
// ============================================================================

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Handled,
    DeadLettered,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Handled => "handled",
            Disposition::DeadLettered => "dead_lettered",
        }
    }
}

pub struct EventConsumer {
    source: Box<dyn MessageSource>,
    handler: Arc<dyn MessageHandler>,
    dlq: Recipient<AddToDlq>,
    metrics: Arc<Metrics>,
    poll_timeout: Duration,
    retry: RetryConfig,
}

impl EventConsumer {
    pub fn new(
        source: Box<dyn MessageSource>,
        handler: Arc<dyn MessageHandler>,
        dlq: Recipient<AddToDlq>,
        metrics: Arc<Metrics>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            handler,
            dlq,
            metrics,
            poll_timeout,
            retry: RetryConfig::consumer(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(poll_timeout_ms = self.poll_timeout.as_millis() as u64, "🔄 Event consumer started");

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            let inbound = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Kafka receive error");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    }
                    continue;
                }
            };

            self.process(&inbound).await;
            self.commit(&inbound);
        }

        tracing::info!("🛑 Event consumer stopped");
    }

    async fn process(&self, message: &InboundMessage) -> Disposition {
        let started = Instant::now();
        let first_failed_at = Utc::now();
        let progress = DeliveryProgress::default();

        tracing::debug!(
            topic = %message.topic,
            key = ?message.key,
            partition = message.partition,
            offset = message.offset,
            "Received message"
        );

        let result = retry_on_transient(&message.topic, self.retry.clone(), |_| {
            self.handler.handle(message, &progress)
        })
        .await;

        let disposition = match result {
            RetryResult::Success(()) => Disposition::Handled,
            RetryResult::Failed(e) => {
                self.dead_letter(message, &e, self.retry.max_attempts, first_failed_at).await;
                Disposition::DeadLettered
            }
            RetryResult::PermanentFailure(e) => {
                self.dead_letter(message, &e, 1, first_failed_at).await;
                Disposition::DeadLettered
            }
        };

        self.metrics
            .record_consumed(&message.topic, disposition.as_str(), started.elapsed().as_secs_f64());
        disposition
    }

    async fn dead_letter(
        &self,
        message: &InboundMessage,
        error: &ServiceError,
        attempts: u32,
        first_failed_at: chrono::DateTime<Utc>,
    ) {
        tracing::error!(
            topic = %message.topic,
            key = ?message.key,
            offset = message.offset,
            error = %error,
            "❌ Message handling failed, sending to DLQ"
        );

        let parked = self
            .dlq
            .send(AddToDlq {
                id: Uuid::now_v7(),
                topic: message.topic.clone(),
                key: message.key.clone(),
                payload: message.payload_text(),
                error_message: error.to_string(),
                failure_count: attempts as i32,
                first_failed_at,
            })
            .await;

        match parked {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(topic = %message.topic, offset = message.offset, error = %e, "Failed to park message in DLQ");
            }
            Err(e) => {
                tracing::error!(topic = %message.topic, offset = message.offset, error = %e, "DLQ actor unreachable");
            }
        }
    }

    fn commit(&self, message: &InboundMessage) {
        if let Err(e) = self.source.commit(message) {
            tracing::warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{inbound, ScriptedHandler, ScriptedSource};
    use actix::prelude::*;
    use std::sync::Mutex;

    const PAYLOAD: &str = r#"{"status":"APPROVED"}"#;

    struct RecordingDlq {
        parked: Arc<Mutex<Vec<AddToDlq>>>,
    }

    impl Actor for RecordingDlq {
        type Context = Context<Self>;
    }

    impl Handler<AddToDlq> for RecordingDlq {
        type Result = Result<(), String>;

        fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
            self.parked.lock().unwrap().push(msg);
            Ok(())
        }
    }

    struct Fixture {
        consumer: EventConsumer,
        source: ScriptedSource,
        handler: Arc<ScriptedHandler>,
        parked: Arc<Mutex<Vec<AddToDlq>>>,
    }

    fn fixture(messages: Vec<InboundMessage>, failures: Vec<ServiceError>) -> Fixture {
        let source = ScriptedSource::with_messages(messages);
        let handler = ScriptedHandler::failing_with(failures);
        let parked = Arc::new(Mutex::new(Vec::new()));
        let dlq = RecordingDlq { parked: parked.clone() }.start();

        let consumer = EventConsumer::new(
            Box::new(source.clone()),
            handler.clone(),
            dlq.recipient(),
            Arc::new(Metrics::new().unwrap()),
            Duration::from_millis(10),
        )
        .with_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        });

        Fixture {
            consumer,
            source,
            handler,
            parked,
        }
    }

    fn parked(f: &Fixture) -> Vec<AddToDlq> {
        f.parked.lock().unwrap().clone()
    }

    #[actix_web::test]
    async fn test_transient_failure_then_success() {
        let f = fixture(vec![], vec![ServiceError::Persistence("connection reset".to_string())]);

        let disposition = f.consumer.process(&inbound("payment-updated", 4, PAYLOAD)).await;

        assert_eq!(disposition, Disposition::Handled);
        assert_eq!(f.handler.calls(), 2);
        assert!(parked(&f).is_empty());
    }

    #[actix_web::test]
    async fn test_permanent_failure_goes_straight_to_dlq() {
        let f = fixture(vec![], vec![ServiceError::BadInput("undecodable payload".to_string())]);

        let disposition = f.consumer.process(&inbound("payment-updated", 4, PAYLOAD)).await;

        assert_eq!(disposition, Disposition::DeadLettered);
        assert_eq!(f.handler.calls(), 1);
        let parked = parked(&f);
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].failure_count, 1);
        assert_eq!(parked[0].topic, "payment-updated");
        assert_eq!(parked[0].key.as_deref(), Some("order-1"));
        assert_eq!(parked[0].payload, PAYLOAD);
        assert!(parked[0].error_message.contains("undecodable payload"));
    }

    #[actix_web::test]
    async fn test_exhausted_retries_record_every_attempt() {
        let failures = (0..3)
            .map(|_| ServiceError::unavailable("product", "connection refused"))
            .collect();
        let f = fixture(vec![], failures);

        let disposition = f.consumer.process(&inbound("order-created", 4, "{}")).await;

        assert_eq!(disposition, Disposition::DeadLettered);
        assert_eq!(f.handler.calls(), 3);
        let parked = parked(&f);
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].failure_count, 3);
        assert!(parked[0].error_message.contains("product unavailable"));
    }

    #[actix_web::test]
    async fn test_run_commits_each_message_and_stops_on_cancel() {
        let f = fixture(
            vec![inbound("payment-updated", 10, "not json"), inbound("payment-updated", 11, PAYLOAD)],
            vec![ServiceError::BadInput("undecodable payload".to_string())],
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(f.consumer.run(shutdown.clone()));

        // The dead-lettered message is committed like any other.
        assert_eq!(f.source.wait_for_commits(2).await, vec![10, 11]);
        assert_eq!(f.parked.lock().unwrap().len(), 1);
        assert_eq!(f.handler.calls(), 2);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer loop did not stop")
            .unwrap();
    }
}
