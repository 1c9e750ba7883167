use actix::prelude::*;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Parks consumed messages whose handler kept failing. Rows live in the
// query database (`dead_letter_messages`) and are replayed by hand.
//
// ============================================================================

pub struct DlqActor {
    pool: PgPool,
    metrics: Arc<Metrics>,
}

impl DlqActor {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), String>")]
pub struct AddToDlq {
    pub id: Uuid,
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

impl Handler<AddToDlq> for DlqActor {
    type Result = ResponseFuture<Result<(), String>>;

    fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
        let pool = self.pool.clone();
        let metrics = self.metrics.clone();

        tracing::error!(
            message_id = %msg.id,
            topic = %msg.topic,
            key = ?msg.key,
            error = %msg.error_message,
            failure_count = msg.failure_count,
            "💀 Adding message to Dead Letter Queue"
        );

        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO dead_letter_messages (
                    id, topic, message_key, payload, error_message,
                    failure_count, first_failed_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(msg.id)
            .bind(&msg.topic)
            .bind(&msg.key)
            .bind(&msg.payload)
            .bind(&msg.error_message)
            .bind(msg.failure_count)
            .bind(msg.first_failed_at)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .map_err(|e| format!("Failed to insert into DLQ: {}", e))?;

            metrics.record_dlq_message(&msg.topic);
            tracing::info!(message_id = %msg.id, "Message stored in DLQ");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    #[actix_web::test]
    async fn test_unreachable_table_reports_failure() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://orders@127.0.0.1:1/orders")
            .unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::new(pool, metrics.clone()).start();

        let result = dlq
            .send(AddToDlq {
                id: Uuid::now_v7(),
                topic: "payment-updated".to_string(),
                key: None,
                payload: "{}".to_string(),
                error_message: "bad input: undecodable payload".to_string(),
                failure_count: 1,
                first_failed_at: Utc::now(),
            })
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert!(err.starts_with("Failed to insert into DLQ"), "{}", err);
        assert_eq!(metrics.dlq_messages.with_label_values(&["payment-updated"]).get(), 0);
    }
}
