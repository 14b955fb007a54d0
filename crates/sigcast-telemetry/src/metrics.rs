//! Prometheus metrics for sigcast.
//!
//! Covers broadcasts, per-subscriber outcomes, confirmations, notification
//! delivery and parser rejections.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a fatal configuration error that should
//! crash at startup. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Broadcasts started.
/// Labels: command (new/close/leverage/edit_sltp/confirm)
pub static BROADCASTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigcast_broadcasts_total",
        "Total broadcasts started",
        &["command"]
    )
    .unwrap()
});

/// Per-subscriber execution outcomes.
pub static OUTCOMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigcast_outcomes_total",
        "Per-subscriber execution outcomes",
        &["command", "kind"]
    )
    .unwrap()
});

/// Wall time of a full broadcast.
pub static BROADCAST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sigcast_broadcast_latency_ms",
        "Broadcast wall time in milliseconds",
        &["command"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Subscriber executions currently holding a concurrency slot.
pub static INFLIGHT_EXECUTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sigcast_inflight_executions",
        "Subscriber executions currently in flight"
    )
    .unwrap()
});

/// Open MANUAL confirmation offers.
pub static PENDING_CONFIRMATIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sigcast_pending_confirmations",
        "Confirmation offers awaiting a decision"
    )
    .unwrap()
});

/// Confirmation resolutions.
/// Labels: result (confirmed/skipped/expired/already_resolved)
pub static CONFIRMATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigcast_confirmations_total",
        "Confirmation offer resolutions",
        &["result"]
    )
    .unwrap()
});

/// Notifications delivered.
pub static NOTIFICATIONS_SENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigcast_notifications_sent_total",
        "Notifications delivered",
        &["recipient"]
    )
    .unwrap()
});

/// Notifications lost.
/// Labels: reason (queue_full/closed/send_failed)
pub static NOTIFICATIONS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigcast_notifications_dropped_total",
        "Notifications dropped before delivery",
        &["reason"]
    )
    .unwrap()
});

/// Operator text rejected by the parser.
pub static PARSE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigcast_parse_failures_total",
        "Operator messages rejected as malformed",
        &["rule"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Broadcast
    // =========================================================================

    pub fn broadcast_started(command: &str) {
        BROADCASTS_TOTAL.with_label_values(&[command]).inc();
    }

    pub fn outcome_recorded(command: &str, kind: &str) {
        OUTCOMES_TOTAL.with_label_values(&[command, kind]).inc();
    }

    pub fn broadcast_latency(command: &str, latency_ms: f64) {
        BROADCAST_LATENCY_MS
            .with_label_values(&[command])
            .observe(latency_ms);
    }

    pub fn execution_inflight_inc() {
        INFLIGHT_EXECUTIONS.inc();
    }

    pub fn execution_inflight_dec() {
        INFLIGHT_EXECUTIONS.dec();
    }

    // =========================================================================
    // Confirmation
    // =========================================================================

    pub fn pending_confirmations_set(count: i64) {
        PENDING_CONFIRMATIONS.set(count);
    }

    pub fn confirmation_resolved(result: &str) {
        CONFIRMATIONS_TOTAL.with_label_values(&[result]).inc();
    }

    // =========================================================================
    // Notification
    // =========================================================================

    pub fn notification_sent(recipient: &str) {
        NOTIFICATIONS_SENT_TOTAL.with_label_values(&[recipient]).inc();
    }

    pub fn notification_dropped(reason: &str) {
        NOTIFICATIONS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    // =========================================================================
    // Parser
    // =========================================================================

    pub fn parse_failed(rule: &str) {
        PARSE_FAILURES_TOTAL.with_label_values(&[rule]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
