// ============================================================================
// CQRS Core - Generic Building Blocks
// ============================================================================
//
// Domain-agnostic abstractions shared by the command and query sides:
// - Aggregate: command validation and state mutation through events
// - IntegrationEvent: typed messages crossing the event bus
//
// Domain modules implement these traits; adapters only see the traits.
//
// ============================================================================

pub mod aggregate;
pub mod event;

pub use aggregate::Aggregate;
pub use event::{EventMetadata, IntegrationEvent};
