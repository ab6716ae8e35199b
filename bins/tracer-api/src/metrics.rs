// Prometheus metrics for the execution path

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Executions by outcome: success, failure, timeout, rejected
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tracer_executions_total",
        "Code executions by terminal outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref EXECUTION_DURATION: Histogram = register_histogram!(
        "tracer_execution_duration_seconds",
        "Time from submission to terminal outcome",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]
    )
    .unwrap();
}

pub fn record_outcome(outcome: &str) {
    EXECUTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
