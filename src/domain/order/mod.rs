// ============================================================================
// Order Domain
// ============================================================================
//
// - value_objects:   OrderStatus state machine, PaymentStatus
// - commands:        PlaceOrder, OrderCommand
// - events:          internal OrderEvent plus the broker payloads
// - aggregate:       Order write model
// - view:            OrderView read model
// - command_handler: placement and transitions (command side)
// - query_handler:   view projection and reads (query side)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod view;
pub mod command_handler;
pub mod query_handler;

pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use view::*;
pub use command_handler::*;
pub use query_handler::*;
