//! Prometheus metrics for commanding.
//!
//! Registered once into a crate-level registry; hosts merge [`REGISTRY`] into
//! their exporter alongside the rest of the StreamHouse metrics.

use crate::request::{MessageKind, Status};
use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Commanding metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Commands received that matched this process
    pub static ref COMMANDS_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamhouse_commanding_received_total", "Commands received by this process"),
        &["command"]
    ).expect("metric can be created");

    /// Terminal results produced by this process
    pub static ref COMMAND_RESULTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamhouse_commanding_results_total", "Command results by status"),
        &["command", "status"]
    ).expect("metric can be created");

    /// Per-command failures
    pub static ref COMMAND_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("streamhouse_commanding_errors_total", "Command failures by error type"),
        &["error_type"]
    ).expect("metric can be created");

    /// Messages that could not be published
    pub static ref DISPATCH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "streamhouse_commanding_dispatch_failures_total",
            "Failed publishes to the commands topic"
        ),
        &["kind"]
    ).expect("metric can be created");

    /// Commands waiting in the tracker for their fetch loop
    pub static ref COMMANDS_PENDING: IntGauge = IntGauge::new(
        "streamhouse_commanding_pending",
        "Commands queued for execution on a fetch loop"
    ).expect("metric can be created");
}

/// Register all commanding metrics. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(COMMANDS_RECEIVED_TOTAL.clone()))
            .ok();
        REGISTRY.register(Box::new(COMMAND_RESULTS_TOTAL.clone())).ok();
        REGISTRY.register(Box::new(COMMAND_ERRORS_TOTAL.clone())).ok();
        REGISTRY
            .register(Box::new(DISPATCH_FAILURES_TOTAL.clone()))
            .ok();
        REGISTRY.register(Box::new(COMMANDS_PENDING.clone())).ok();
    });
}

pub(crate) fn record_received(command: &str) {
    COMMANDS_RECEIVED_TOTAL.with_label_values(&[command]).inc();
}

pub(crate) fn record_result(command: &str, status: Status) {
    COMMAND_RESULTS_TOTAL
        .with_label_values(&[command, status.as_str()])
        .inc();
}

pub(crate) fn record_error(error_type: &str) {
    COMMAND_ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

pub(crate) fn record_dispatch_failure(kind: MessageKind) {
    DISPATCH_FAILURES_TOTAL
        .with_label_values(&[&kind.to_string()])
        .inc();
}

pub(crate) fn set_pending(depth: usize) {
    COMMANDS_PENDING.set(depth as i64);
}
