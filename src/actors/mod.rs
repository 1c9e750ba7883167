// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for the background side of the service.
//
// Structure:
// - core/           - Health types shared by the actors and the HTTP layer
// - infrastructure/ - Coordinator, health monitor, DLQ, consumer and
//                     expiration loops
//
// Note: Order logic lives in the command/query handlers, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

mod core;
mod infrastructure;

pub use infrastructure::{
    BackgroundWork, CoordinatorActor, EventRouter, ExpirationListener, GetSystemHealth, HealthMonitorActor, Shutdown,
};
