//! Prometheus metrics for the guardrail engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

/// Guardrail decisions.
/// Labels: outcome (allow/reject), reason (rejection code or "none")
pub static GUARDRAIL_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_guardrail_decisions_total",
        "Guardrail decisions by outcome and reason",
        &["outcome", "reason"]
    )
    .unwrap()
});

/// Conditional order transitions.
/// Labels: status (target status)
pub static ORDER_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_order_transitions_total",
        "Conditional order transitions by target status",
        &["status"]
    )
    .unwrap()
});

/// Conditional orders currently PENDING.
pub static PENDING_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "guard_pending_orders",
        "Conditional orders currently pending"
    )
    .unwrap()
});

/// Kill switch ARMED -> TRIGGERED transitions.
pub static KILL_SWITCH_TRIGGERS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "guard_kill_switch_triggers_total",
        "Kill switch activations"
    )
    .unwrap()
});

/// Users currently halted by the kill switch.
pub static KILL_SWITCH_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "guard_kill_switch_active",
        "Users whose kill switch is currently triggered"
    )
    .unwrap()
});

/// Broker submission attempts.
/// Labels: outcome (filled/rejected/error)
pub static BROKER_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_broker_attempts_total",
        "Broker submission attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Broker call latency in milliseconds.
/// Labels: operation (submit/close/list)
pub static BROKER_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "guard_broker_latency_ms",
        "Broker call latency in milliseconds",
        &["operation"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Position close results during close-all.
/// Labels: outcome (closed/failed)
pub static POSITION_CLOSE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guard_position_close_total",
        "Position close results during kill switch close-all",
        &["outcome"]
    )
    .unwrap()
});

/// Market ticks processed.
pub static TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("guard_ticks_total", "Market ticks processed").unwrap()
});

/// Metrics helper for recording events.
pub struct Metrics;

impl Metrics {
    /// Record a guardrail ALLOW.
    pub fn trade_allowed() {
        GUARDRAIL_DECISIONS_TOTAL
            .with_label_values(&["allow", "none"])
            .inc();
    }

    /// Record a guardrail REJECT with its first reason code.
    pub fn trade_rejected(reason: &str) {
        GUARDRAIL_DECISIONS_TOTAL
            .with_label_values(&["reject", reason])
            .inc();
    }

    /// Record an order transition into `status`.
    pub fn order_transition(status: &str) {
        ORDER_TRANSITIONS_TOTAL.with_label_values(&[status]).inc();
    }

    pub fn pending_orders_inc() {
        PENDING_ORDERS.inc();
    }

    pub fn pending_orders_dec() {
        PENDING_ORDERS.dec();
    }

    pub fn kill_switch_triggered() {
        KILL_SWITCH_TRIGGERS_TOTAL.inc();
        KILL_SWITCH_ACTIVE.inc();
    }

    pub fn kill_switch_reset() {
        KILL_SWITCH_ACTIVE.dec();
    }

    /// Record a broker attempt outcome.
    pub fn broker_attempt(outcome: &str) {
        BROKER_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn broker_latency(operation: &str, latency_ms: f64) {
        BROKER_LATENCY_MS
            .with_label_values(&[operation])
            .observe(latency_ms);
    }

    pub fn position_close(outcome: &str) {
        POSITION_CLOSE_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn tick_processed() {
        TICKS_TOTAL.inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_metrics() {
        Metrics::trade_rejected("POSITION_SIZE");
        Metrics::order_transition("FILLED");
        Metrics::tick_processed();

        let text = Metrics::render().unwrap();
        assert!(text.contains("guard_guardrail_decisions_total"));
        assert!(text.contains("POSITION_SIZE"));
        assert!(text.contains("guard_order_transitions_total"));
        assert!(text.contains("guard_ticks_total"));
    }
}
