use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// Integration Events
// ============================================================================
//
// Payloads travel as plain JSON values keyed by the order id. Metadata is
// carried in message headers so the value stays the exact contract other
// services consume.
//
// ============================================================================

pub trait IntegrationEvent: Serialize + Send + Sync {
    /// Topic the event is published to.
    const TOPIC: &'static str;

    /// Stable type name, sent as the `event_type` header.
    fn event_type() -> &'static str;

    /// Partition key.
    fn key(&self) -> String;

    fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn metadata(&self) -> EventMetadata {
        EventMetadata::new(Self::event_type())
    }
}

#[derive(Debug, Clone)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub event_type: &'static str,
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new(event_type: &'static str) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type,
            occurred_at: Utc::now(),
        }
    }
}
