//! Prometheus metrics for the dispatcher.
//!
//! This module provides counters for dispatch calls and per-recipient
//! delivery outcomes, plus a helper for exporting them in the Prometheus
//! text format.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "courier";

lazy_static! {
    /// Total dispatch calls started
    pub static ref DISPATCHES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dispatches_total", METRIC_PREFIX),
        "Total dispatch calls started"
    ).unwrap();

    /// Recipients whose message reached the transport successfully
    pub static ref RECIPIENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_recipients_delivered_total", METRIC_PREFIX),
        "Recipients delivered successfully"
    ).unwrap();

    /// Recipients that hard-failed (missing template or delivery error)
    pub static ref RECIPIENTS_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_recipients_failed_total", METRIC_PREFIX),
        "Recipients that failed"
    ).unwrap();

    /// Transport failures suppressed by the fail-silently policy
    pub static ref RECIPIENTS_SUPPRESSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_recipients_suppressed_total", METRIC_PREFIX),
        "Transport failures suppressed by fail-silently"
    ).unwrap();

    /// Messages sent without a rich body because the HTML template was missing
    pub static ref HTML_FALLBACK_TOTAL: IntCounter = register_int_counter!(
        format!("{}_html_fallback_total", METRIC_PREFIX),
        "Messages sent plain-text only because the HTML template was missing"
    ).unwrap();
}

/// Helper for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_dispatch() {
        DISPATCHES_TOTAL.inc();
    }

    pub fn record_delivered() {
        RECIPIENTS_DELIVERED_TOTAL.inc();
    }

    pub fn record_failed() {
        RECIPIENTS_FAILED_TOTAL.inc();
    }

    pub fn record_suppressed() {
        RECIPIENTS_SUPPRESSED_TOTAL.inc();
    }

    pub fn record_html_fallback() {
        HTML_FALLBACK_TOTAL.inc();
    }
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = DISPATCHES_TOTAL.get();
        DispatchMetrics::record_dispatch();
        // other tests dispatch concurrently, so only a lower bound holds
        assert!(DISPATCHES_TOTAL.get() >= before + 1);
    }

    #[test]
    fn test_encode_metrics() {
        DispatchMetrics::record_delivered();
        let encoded = encode_metrics().unwrap();
        assert!(encoded.contains("courier_recipients_delivered_total"));
    }
}
