use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::order::{OrderCommandHandler, OrderStatus, TransitionOutcome};
use crate::errors::ServiceError;
use crate::metrics::Metrics;
use crate::store::{order_id_from_key, OrderExpiryStore};

// ============================================================================
// Expiration Listener
// ============================================================================
//
// Two sources feed EXPIRED transitions:
// - key-expired notifications from the expiry store (normal path)
// - a periodic sweep for pending orders past their validity, which covers
//   notifications lost while the process or its subscription was down
//
// Both go through the command handler, so repeats are harmless.
//
// ============================================================================

const SWEEP_BATCH: i64 = 500;
const INITIAL_RESUBSCRIBE_DELAY: Duration = Duration::from_millis(500);
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

pub struct ExpirationListener {
    commands: Arc<OrderCommandHandler>,
    expiry: Arc<dyn OrderExpiryStore>,
    metrics: Arc<Metrics>,
    sweep_interval: Duration,
}

impl ExpirationListener {
    pub fn new(
        commands: Arc<OrderCommandHandler>,
        expiry: Arc<dyn OrderExpiryStore>,
        metrics: Arc<Metrics>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            commands,
            expiry,
            metrics,
            sweep_interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut resubscribe_delay = INITIAL_RESUBSCRIBE_DELAY;

        'subscription: loop {
            let mut expirations = match self.expiry.expirations().await {
                Ok(stream) => {
                    resubscribe_delay = INITIAL_RESUBSCRIBE_DELAY;
                    stream
                }
                Err(e) => {
                    tracing::error!(error = %e, delay_ms = resubscribe_delay.as_millis() as u64, "Expiration subscription failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'subscription,
                        _ = tokio::time::sleep(resubscribe_delay) => {}
                    }
                    resubscribe_delay = (resubscribe_delay * 2).min(MAX_RESUBSCRIBE_DELAY);
                    continue;
                }
            };

            tracing::info!("⏰ Expiration listener running");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break 'subscription,
                    _ = sweep.tick() => self.sweep().await,
                    key = expirations.next() => match key {
                        Some(key) => self.on_key_expired(&key).await,
                        None => {
                            tracing::warn!("Expiration stream ended, resubscribing");
                            break;
                        }
                    },
                }
            }
        }

        tracing::info!("🛑 Expiration listener stopped");
    }

    async fn on_key_expired(&self, key: &str) {
        match order_id_from_key(key) {
            Some(order_id) => {
                self.expire(order_id).await;
            }
            None => tracing::debug!(key = %key, "Ignoring expiry of unrelated key"),
        }
    }

    async fn sweep(&self) {
        match self.commands.overdue_pending_orders(SWEEP_BATCH).await {
            Ok(order_ids) => {
                if !order_ids.is_empty() {
                    tracing::info!(count = order_ids.len(), "Expiring overdue pending orders");
                }
                for order_id in order_ids {
                    self.expire(order_id).await;
                }
            }
            Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
        }
    }

    async fn expire(&self, order_id: Uuid) -> &'static str {
        let outcome = match self.commands.set_status(order_id, OrderStatus::Expired).await {
            Ok(TransitionOutcome::Changed { .. }) => {
                tracing::info!(order_id = %order_id, "⌛ Order expired");
                "expired"
            }
            Ok(TransitionOutcome::Unchanged(_)) => "already_expired",
            Err(ServiceError::InvalidTransition { from, .. }) => {
                tracing::debug!(order_id = %order_id, status = %from, "Order settled before expiry");
                "settled"
            }
            Err(ServiceError::NotFound(_)) => {
                tracing::warn!(order_id = %order_id, "Expired key for unknown order");
                "unknown_order"
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "❌ Failed to expire order");
                "failed"
            }
        };

        self.metrics.record_expiration(outcome);
        outcome
    }
}
