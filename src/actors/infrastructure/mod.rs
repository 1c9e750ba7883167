// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Broker consumption (router + loop)
// - Order expiration (notifications + sweep)
// - Dead letter queue
// - Health monitoring
// - Coordination and shutdown
//
// ============================================================================

mod coordinator;
mod dlq;
mod event_consumer;
mod event_router;
mod expiration_listener;
mod health_monitor;

pub use coordinator::{BackgroundWork, CoordinatorActor, Shutdown};
pub use dlq::{AddToDlq, DlqActor};
pub use event_consumer::EventConsumer;
pub use event_router::EventRouter;
pub use expiration_listener::ExpirationListener;
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, UpdateHealth};
