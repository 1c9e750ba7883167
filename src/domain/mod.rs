// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Commands and events
// - Errors
// - Aggregate implementation
// - Read-side view
// - Command and query handlers
//
// Adapters (stores, broker, HTTP clients) are reached through traits only.
//
// ============================================================================

pub mod order;
