use actix::prelude::*;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actors::core::HealthStatus;
use crate::messaging::{MessageHandler, MessageSource};
use crate::metrics::Metrics;
use super::{DlqActor, EventConsumer, ExpirationListener, GetSystemHealth, HealthMonitorActor, UpdateHealth};

// ============================================================================
// Coordinator Actor - Orchestrates the background side of the service
// ============================================================================
//
// Responsibilities:
// - Starts the DLQ actor
// - Spawns the broker consumer loop and the expiration loop
// - Reports loop liveness to the health monitor
// - Coordinates graceful shutdown: cancel, drain loops, stop children
//
// Hierarchy:
//   CoordinatorActor
//   ├── DlqActor
//   ├── HealthMonitorActor (shared with the HTTP layer)
//   ├── event consumer loop (task)
//   └── expiration loop (task)
//
// ============================================================================

const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Everything the background loops need, handed over once at start.
pub struct BackgroundWork {
    pub source: Box<dyn MessageSource>,
    pub handler: Arc<dyn MessageHandler>,
    pub expiration: ExpirationListener,
    pub poll_timeout: Duration,
}

struct SupervisedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct CoordinatorActor {
    query_pool: PgPool,
    metrics: Arc<Metrics>,
    health_monitor: Addr<HealthMonitorActor>,
    work: Option<BackgroundWork>,
    shutdown: CancellationToken,
    tasks: Vec<SupervisedTask>,
    dlq_actor: Option<Addr<DlqActor>>,
}

impl CoordinatorActor {
    pub fn new(
        query_pool: PgPool,
        metrics: Arc<Metrics>,
        health_monitor: Addr<HealthMonitorActor>,
        work: BackgroundWork,
    ) -> Self {
        Self {
            query_pool,
            metrics,
            health_monitor,
            work: Some(work),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
            dlq_actor: None,
        }
    }

    fn start_children(&mut self) {
        let Some(work) = self.work.take() else {
            return;
        };

        let dlq_actor = DlqActor::new(self.query_pool.clone(), self.metrics.clone()).start();
        self.dlq_actor = Some(dlq_actor.clone());
        self.report("dlq_actor", HealthStatus::Healthy, "DLQ actor started");

        let consumer = EventConsumer::new(
            work.source,
            work.handler,
            dlq_actor.recipient(),
            self.metrics.clone(),
            work.poll_timeout,
        );
        self.tasks.push(SupervisedTask {
            name: "event_consumer",
            handle: tokio::spawn(consumer.run(self.shutdown.clone())),
        });
        self.report("event_consumer", HealthStatus::Healthy, "consumer loop started");

        self.tasks.push(SupervisedTask {
            name: "expiration_listener",
            handle: tokio::spawn(work.expiration.run(self.shutdown.clone())),
        });
        self.report("expiration_listener", HealthStatus::Healthy, "expiration loop started");

        tracing::info!("✅ Background loops started");
    }

    fn report(&self, component: &str, status: HealthStatus, details: &str) {
        self.health_monitor.do_send(UpdateHealth {
            component: component.to_string(),
            status,
            details: Some(details.to_string()),
        });
    }

    fn check_liveness(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        for task in &self.tasks {
            if task.handle.is_finished() {
                tracing::error!(task = task.name, "💀 Background loop exited unexpectedly");
                self.report(
                    task.name,
                    HealthStatus::Unhealthy("loop exited".to_string()),
                    "task finished before shutdown",
                );
            }
        }
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_children();

        ctx.run_interval(LIVENESS_CHECK_INTERVAL, |act, _ctx| {
            act.check_liveness();

            let health_monitor = act.health_monitor.clone();
            actix::spawn(async move {
                match health_monitor.send(GetSystemHealth).await {
                    Ok(health) => match health.overall_status {
                        HealthStatus::Healthy => tracing::debug!("System health check: Healthy"),
                        HealthStatus::Degraded(ref msg) => {
                            tracing::warn!("System health check: Degraded - {}", msg)
                        }
                        HealthStatus::Unhealthy(ref msg) => {
                            tracing::error!("System health check: Unhealthy - {}", msg)
                        }
                    },
                    Err(e) => tracing::error!("Failed to get system health: {}", e),
                }
            });
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Stop the loops, wait for them to drain, then stop the actors.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: Shutdown, _ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Received shutdown signal");
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut self.tasks);
        let drain = async move {
            for task in tasks {
                if let Err(e) = task.handle.await {
                    tracing::error!(task = task.name, error = %e, "Background loop panicked");
                }
            }
        };

        Box::pin(drain.into_actor(self).map(|_, act, ctx| {
            if let Some(dlq_actor) = act.dlq_actor.take() {
                dlq_actor.do_send(StopActor);
            }
            act.health_monitor.do_send(StopActor);
            ctx.stop();
        }))
    }
}

/// Message to gracefully stop an actor
#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for DlqActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("DlqActor received stop signal");
        ctx.stop();
    }
}
