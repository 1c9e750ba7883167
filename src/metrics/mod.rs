mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::domain::order::OrderStatus;
use crate::utils::CircuitState;

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Order placement outcomes and the stage a failed placement stopped at
// - Status transitions (from/to)
// - Broker consumer throughput, latency and outcome per topic
// - Expiration handling and dead-lettered messages
// - Outbound HTTP latency per dependency and circuit breaker state
//
// Scraped from the dedicated metrics server at /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Command side
    pub orders_placed: IntCounter,
    pub placement_failures: IntCounterVec,
    pub status_transitions: IntCounterVec,
    pub events_published: IntCounterVec,

    // Consumer side
    pub messages_consumed: IntCounterVec,
    pub message_handling_duration: HistogramVec,
    pub dlq_messages: IntCounterVec,
    pub expirations: IntCounterVec,

    // Dependencies
    pub outbound_request_duration: HistogramVec,
    pub circuit_breaker_state: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("orders_placed_total", "Orders placed successfully")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let placement_failures = IntCounterVec::new(
            Opts::new("order_placement_failures_total", "Failed placements by stage"),
            &["stage"],
        )?;
        registry.register(Box::new(placement_failures.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Events published to the broker"),
            &["topic"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let messages_consumed = IntCounterVec::new(
            Opts::new("messages_consumed_total", "Broker messages consumed"),
            &["topic", "outcome"],
        )?;
        registry.register(Box::new(messages_consumed.clone()))?;

        let message_handling_duration = HistogramVec::new(
            HistogramOpts::new("message_handling_duration_seconds", "Consumer handler duration")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["topic"],
        )?;
        registry.register(Box::new(message_handling_duration.clone()))?;

        let dlq_messages = IntCounterVec::new(
            Opts::new("dlq_messages_total", "Messages parked in the dead letter table"),
            &["topic"],
        )?;
        registry.register(Box::new(dlq_messages.clone()))?;

        let expirations = IntCounterVec::new(
            Opts::new("order_expirations_total", "Expiration notifications handled"),
            &["outcome"],
        )?;
        registry.register(Box::new(expirations.clone()))?;

        let outbound_request_duration = HistogramVec::new(
            HistogramOpts::new("outbound_request_duration_seconds", "Outbound HTTP call duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["service", "outcome"],
        )?;
        registry.register(Box::new(outbound_request_duration.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            placement_failures,
            status_transitions,
            events_published,
            messages_consumed,
            message_handling_duration,
            dlq_messages,
            expirations,
            outbound_request_duration,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_placed(&self) {
        self.orders_placed.inc();
    }

    pub fn record_placement_failure(&self, stage: &str) {
        self.placement_failures.with_label_values(&[stage]).inc();
    }

    pub fn record_transition(&self, from: OrderStatus, to: OrderStatus) {
        self.status_transitions
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    pub fn record_published(&self, topic: &str) {
        self.events_published.with_label_values(&[topic]).inc();
    }

    pub fn record_consumed(&self, topic: &str, outcome: &str, duration_secs: f64) {
        self.messages_consumed.with_label_values(&[topic, outcome]).inc();
        self.message_handling_duration
            .with_label_values(&[topic])
            .observe(duration_secs);
    }

    pub fn record_dlq_message(&self, topic: &str) {
        self.dlq_messages.with_label_values(&[topic]).inc();
    }

    pub fn record_expiration(&self, outcome: &str) {
        self.expirations.with_label_values(&[outcome]).inc();
    }

    pub fn observe_outbound(&self, service: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.outbound_request_duration
            .with_label_values(&[service, outcome])
            .observe(duration_secs);
    }

    pub fn set_circuit_state(&self, breaker: &str, state: CircuitState) {
        self.circuit_breaker_state
            .with_label_values(&[breaker])
            .set(state.as_gauge());
    }
}
