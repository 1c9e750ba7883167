use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clients::ProductCatalog;
use crate::domain::order::{
    OrderCommandHandler, OrderCreatedEvent, OrderQueryHandler, OrderStatusUpdatedEvent, PaymentStatus,
    PaymentUpdatedEvent, ORDER_CREATED_TOPIC, ORDER_STATUS_UPDATED_TOPIC, PAYMENT_UPDATED_TOPIC,
};
use crate::errors::{ServiceError, ServiceResult};
use crate::messaging::{DeliveryProgress, InboundMessage, MessageHandler};

// ============================================================================
// Event Router - topic → use case
// ============================================================================
//
//   order-created         → Product lookups → materialize view
//   payment-updated       → command side, then view payment columns
//   order-status-updated  → view status
//
// Undecodable payloads are permanent failures; unknown topics are skipped.
// A payment already recorded on the command side is not recorded again
// when only the view step of the same delivery is retried.
//
// ============================================================================

const PAYMENT_COMMAND_STEP: &str = "payment_command";

pub struct EventRouter {
    commands: Arc<OrderCommandHandler>,
    queries: Arc<OrderQueryHandler>,
    catalog: Arc<dyn ProductCatalog>,
    product_token: Option<String>,
}

impl EventRouter {
    pub fn new(
        commands: Arc<OrderCommandHandler>,
        queries: Arc<OrderQueryHandler>,
        catalog: Arc<dyn ProductCatalog>,
        product_token: Option<String>,
    ) -> Self {
        Self {
            commands,
            queries,
            catalog,
            product_token,
        }
    }

    async fn on_order_created(&self, event: &OrderCreatedEvent) -> ServiceResult<()> {
        let mut products = HashMap::new();
        for item in &event.items {
            if products.contains_key(&item.product_id) {
                continue;
            }
            let product = self
                .catalog
                .product(self.product_token.as_deref(), item.product_id)
                .await?;
            products.insert(item.product_id, product);
        }

        self.queries.materialize_order_view(event, &products).await?;
        Ok(())
    }

    async fn on_payment_updated(&self, event: &PaymentUpdatedEvent, progress: &DeliveryProgress) -> ServiceResult<()> {
        if progress.is_done(PAYMENT_COMMAND_STEP) {
            tracing::debug!(order_id = %event.order_id, "Payment already recorded for this delivery");
        } else {
            let status = PaymentStatus::from_wire(&event.status);
            if status.is_none() {
                tracing::warn!(
                    order_id = %event.order_id,
                    status = %event.status,
                    "Unrecognized payment status, recording payment id only"
                );
            }

            self.commands
                .apply_payment_update(event.order_id, event.payment_id, status)
                .await?;
            progress.mark_done(PAYMENT_COMMAND_STEP);
        }

        self.queries.apply_payment_to_view(event).await
    }
}

#[async_trait]
impl MessageHandler for EventRouter {
    async fn handle(&self, message: &InboundMessage, progress: &DeliveryProgress) -> ServiceResult<()> {
        match message.topic.as_str() {
            ORDER_CREATED_TOPIC => {
                let event: OrderCreatedEvent = decode(message)?;
                self.on_order_created(&event).await
            }
            PAYMENT_UPDATED_TOPIC => {
                let event: PaymentUpdatedEvent = decode(message)?;
                self.on_payment_updated(&event, progress).await
            }
            ORDER_STATUS_UPDATED_TOPIC => {
                let event: OrderStatusUpdatedEvent = decode(message)?;
                self.queries
                    .apply_status_to_view(event.order_id, event.status)
                    .await
            }
            other => {
                tracing::warn!(topic = %other, offset = message.offset, "Skipping message from unexpected topic");
                Ok(())
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(message: &InboundMessage) -> ServiceResult<T> {
    serde_json::from_slice(&message.payload).map_err(|e| {
        ServiceError::BadInput(format!(
            "undecodable {} payload at offset {}: {}",
            message.topic, message.offset, e
        ))
    })
}
