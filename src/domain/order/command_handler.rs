use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clients::{ProductCatalog, ShippingCostClient, StockMovement, StockMovementItem, WarehouseClient};
use crate::cqrs::Aggregate;
use crate::errors::{ServiceError, ServiceResult};
use crate::messaging::{publish_event, EventPublisher};
use crate::metrics::Metrics;
use crate::store::{OrderChange, OrderCommandStore, OrderExpiryStore};

use super::aggregate::Order;
use super::commands::{OrderCommand, PlaceOrder};
use super::events::{OrderCreatedEvent, OrderEvent, OrderStatusUpdatedEvent, SaleCreatedEvent};
use super::value_objects::{to_money, OrderStatus, PaymentStatus};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → load Order → Aggregate → compare-and-set → side effects
//
// Side effects of a committed status change:
//   leaving PENDING      → TTL key removed
//   every transition     → order-status-updated
//   entering DELIVERED   → sale-created
//
// ============================================================================

/// Attempts before a contended order update is reported as a failure.
const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Debug, Clone)]
pub struct OrderSettings {
    /// Lifetime of a pending order before it expires.
    pub validity: Duration,
    /// Reject placements whose unit price differs from the catalog.
    pub verify_client_price: bool,
}

/// Ports the command side talks to.
pub struct CommandDependencies {
    pub store: Arc<dyn OrderCommandStore>,
    pub expiry: Arc<dyn OrderExpiryStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub shipping: Arc<dyn ShippingCostClient>,
    pub catalog: Arc<dyn ProductCatalog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Changed { from: OrderStatus, to: OrderStatus },
    /// Nothing to do; the order already reflects the command.
    Unchanged(OrderStatus),
}

pub struct OrderCommandHandler {
    deps: CommandDependencies,
    settings: OrderSettings,
    metrics: Arc<Metrics>,
}

impl OrderCommandHandler {
    pub fn new(deps: CommandDependencies, settings: OrderSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            deps,
            settings,
            metrics,
        }
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Place an order on behalf of the token's owner.
    ///
    /// Lookups (catalog, nearest warehouse, shipping) run before the stock
    /// movement; the order is persisted before its TTL key is registered and
    /// before `order-created` is published.
    pub async fn place_order(&self, command: PlaceOrder, token: &str) -> ServiceResult<Order> {
        let mut order = self.stage("validate", Order::place(command, Utc::now()).map_err(ServiceError::from))?;

        if self.settings.verify_client_price {
            self.stage("catalog", self.verify_prices(&order, token).await)?;
        }

        let product_ids: Vec<Uuid> = order.items.iter().map(|item| item.product_id).collect();
        for (index, product_id) in product_ids.into_iter().enumerate() {
            let warehouse_zip = self.stage(
                "warehouse_nearest",
                self.deps
                    .warehouse
                    .nearest_warehouse_zip(token, product_id, &order.address.zipcode)
                    .await,
            )?;
            let cost = self.stage(
                "shipping_cost",
                self.deps
                    .shipping
                    .shipping_cost(&order.address.zipcode, &warehouse_zip)
                    .await,
            )?;
            order.record_shipping_cost(index, cost)?;
        }
        order.validate()?;

        let movement = StockMovement {
            items: order
                .items
                .iter()
                .map(|item| StockMovementItem {
                    product_id: item.product_id,
                    quantity: item.product_quantity,
                    price: item.product_price,
                })
                .collect(),
            zipcode: order.address.zipcode.clone(),
        };
        self.stage("stock_movement", self.deps.warehouse.move_out(token, &movement).await)?;

        if let Err(e) = self.deps.store.insert(&order).await {
            // Stock has already left the warehouse; there is no automatic movein.
            tracing::error!(
                order_id = %order.id,
                user_id = %order.user_id,
                compensation_required = true,
                error = %e,
                "❌ Order not persisted after stock movement"
            );
            self.metrics.record_placement_failure("persist");
            return Err(e);
        }

        self.stage(
            "expiry",
            self.deps.expiry.register(order.id, self.settings.validity).await,
        )?;

        self.stage(
            "publish",
            publish_event(self.deps.publisher.as_ref(), &OrderCreatedEvent::from_order(&order)).await,
        )?;

        self.metrics.record_order_placed();
        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            items = order.items.len(),
            total_price = %order.total_price,
            "✅ Order placed"
        );
        Ok(order)
    }

    async fn verify_prices(&self, order: &Order, token: &str) -> ServiceResult<()> {
        for item in &order.items {
            let product = self.deps.catalog.product(Some(token), item.product_id).await?;
            if to_money(product.price) != item.product_price {
                return Err(ServiceError::BadInput(format!(
                    "price {} for product {} does not match catalog price {}",
                    item.product_price, item.product_id, product.price
                )));
            }
        }
        Ok(())
    }

    fn stage<T>(&self, stage: &'static str, result: ServiceResult<T>) -> ServiceResult<T> {
        if let Err(e) = &result {
            tracing::warn!(stage, error = %e, "Order placement failed");
            self.metrics.record_placement_failure(stage);
        }
        result
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Record a payment decision. Idempotent under redelivery.
    pub async fn apply_payment_update(
        &self,
        order_id: Uuid,
        payment_id: Uuid,
        status: Option<PaymentStatus>,
    ) -> ServiceResult<TransitionOutcome> {
        self.execute(order_id, OrderCommand::RecordPayment { payment_id, status })
            .await
    }

    /// Administrative or expiration-driven transition.
    pub async fn set_status(&self, order_id: Uuid, target: OrderStatus) -> ServiceResult<TransitionOutcome> {
        self.execute(order_id, OrderCommand::ChangeStatus { target })
            .await
    }

    /// Remaining lifetime of a pending order.
    ///
    /// The order's status decides; a key that outlived its order (failed
    /// removal on a transition) is not reported as a lifetime.
    pub async fn get_ttl(&self, order_id: Uuid) -> ServiceResult<Duration> {
        let order = self
            .deps
            .store
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))?;
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::NotPending(order_id));
        }

        self.deps
            .expiry
            .remaining(order_id)
            .await?
            .ok_or(ServiceError::NotPending(order_id))
    }

    /// Pending orders older than the validity period, for the expiry sweep.
    pub async fn overdue_pending_orders(&self, limit: i64) -> ServiceResult<Vec<Uuid>> {
        let validity = chrono::Duration::from_std(self.settings.validity)
            .map_err(|e| ServiceError::BadInput(format!("validity out of range: {}", e)))?;
        self.deps
            .store
            .find_pending_created_before(Utc::now() - validity, limit)
            .await
    }

    async fn execute(&self, order_id: Uuid, command: OrderCommand) -> ServiceResult<TransitionOutcome> {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let mut order = self
                .deps
                .store
                .find(order_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))?;
            let expected_status = order.status;

            let events = order.execute(&command)?;
            if events.is_empty() {
                if requested_status(&command) == Some(order.status) && order.status != OrderStatus::Pending {
                    // Redelivery of a transition already applied; re-announce so a
                    // lost status event still reaches the view.
                    self.announce_status(&order).await?;
                }
                return Ok(TransitionOutcome::Unchanged(order.status));
            }

            let change = OrderChange {
                order_id,
                expected_status,
                status: order.status,
                payment_id: order.payment_id,
                updated_at: order.updated_at,
            };
            if !self.deps.store.update(&change).await? {
                tracing::warn!(order_id = %order_id, attempt, "Order changed concurrently, reloading");
                continue;
            }

            return self.after_commit(&order, &events).await;
        }

        Err(ServiceError::Persistence(format!(
            "order {} kept changing concurrently",
            order_id
        )))
    }

    async fn after_commit(&self, order: &Order, events: &[OrderEvent]) -> ServiceResult<TransitionOutcome> {
        let mut outcome = TransitionOutcome::Unchanged(order.status);

        for event in events {
            match event {
                OrderEvent::PaymentRecorded { payment_id } => {
                    tracing::info!(order_id = %order.id, payment_id = %payment_id, "Payment recorded");
                }
                OrderEvent::StatusChanged { from, to } => {
                    self.metrics.record_transition(*from, *to);
                    tracing::info!(order_id = %order.id, from = %from, to = %to, "🎯 Order status changed");

                    if *from == OrderStatus::Pending {
                        // A surviving key only produces a redundant EXPIRED attempt,
                        // which the state machine rejects.
                        if let Err(e) = self.deps.expiry.remove(order.id).await {
                            tracing::warn!(order_id = %order.id, error = %e, "Failed to remove expiry key");
                        }
                    }

                    self.announce_status(order).await?;

                    if *to == OrderStatus::Delivered {
                        publish_event(self.deps.publisher.as_ref(), &SaleCreatedEvent::from_order(order)).await?;
                    }

                    outcome = TransitionOutcome::Changed { from: *from, to: *to };
                }
            }
        }

        Ok(outcome)
    }

    async fn announce_status(&self, order: &Order) -> ServiceResult<()> {
        publish_event(
            self.deps.publisher.as_ref(),
            &OrderStatusUpdatedEvent {
                order_id: order.id,
                status: order.status,
            },
        )
        .await
    }
}

fn requested_status(command: &OrderCommand) -> Option<OrderStatus> {
    match command {
        OrderCommand::ChangeStatus { target } => Some(*target),
        OrderCommand::RecordPayment { status, .. } => status.and_then(|s| s.order_status()),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
