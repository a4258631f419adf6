//! Prometheus metrics for the HTTP API.
//!
//! [`RpcMetrics`] owns a dedicated [`Registry`]; `GET /metrics` encodes it in
//! the Prometheus text exposition format.

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

pub struct RpcMetrics {
    pub registry: Registry,
    /// Responses by endpoint and outcome code (`OK` or an error code).
    pub responses: IntCounterVec,
    /// Handler latency by endpoint, in milliseconds.
    pub latency_ms: HistogramVec,
}

impl RpcMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let responses = register_int_counter_vec_with_registry!(
            Opts::new(
                "presence_rpc_responses_total",
                "Responses by endpoint and outcome code"
            ),
            &["endpoint", "code"],
            registry
        )?;

        let latency_ms = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "presence_rpc_latency_ms",
                "Handler latency in milliseconds"
            )
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
            &["endpoint"],
            registry
        )?;

        Ok(Self {
            registry,
            responses,
            latency_ms,
        })
    }

    pub fn observe(&self, endpoint: &str, code: &str, elapsed: Duration) {
        self.responses.with_label_values(&[endpoint, code]).inc();
        self.latency_ms
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64() * 1000.0);
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
