// ============================================================================
// Core Actor Abstractions
// ============================================================================

pub mod health;

pub use health::*;
