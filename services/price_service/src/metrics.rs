//! Prometheus collectors for the price service
//!
//! Collectors are registered into a caller-owned [`Registry`] and handed to
//! each component at construction, so tests can run with a fresh registry.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Histogram,
    IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};

/// Gap buckets in seconds, from sub-second updates to the 5 minute age cutoff
const GAP_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];

#[derive(Debug, Clone)]
pub struct PriceServiceMetrics {
    pub messages_received: IntCounter,
    pub messages_duplicate: IntCounter,
    pub messages_decode_failed: IntCounter,
    /// Batches dropped by the wall-clock age filter
    pub messages_too_old: IntCounter,
    /// Batches with no feed newer than stored
    pub messages_stale: IntCounter,
    pub price_updates: IntCounter,
    pub attestation_time_gap: Histogram,
    pub publish_time_gap: Histogram,
    pub ws_interactions: IntCounterVec,
    pub ws_connections: IntGauge,
    pub listener_connected: IntGauge,
    pub query_requests: IntCounterVec,
}

impl PriceServiceMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            messages_received: register_int_counter_with_registry!(
                "messages_received_total",
                "Signed messages received from the gossip stream",
                registry
            )?,
            messages_duplicate: register_int_counter_with_registry!(
                "messages_duplicate_total",
                "Byte-identical re-deliveries dropped by the dedup window",
                registry
            )?,
            messages_decode_failed: register_int_counter_with_registry!(
                "messages_decode_failed_total",
                "Messages that could not be decoded",
                registry
            )?,
            messages_too_old: register_int_counter_with_registry!(
                "messages_too_old_total",
                "Batches dropped for being older than the age cutoff",
                registry
            )?,
            messages_stale: register_int_counter_with_registry!(
                "messages_stale_total",
                "Batches where no feed was newer than the stored value",
                registry
            )?,
            price_updates: register_int_counter_with_registry!(
                "price_updates_total",
                "Accepted per-feed price updates",
                registry
            )?,
            attestation_time_gap: register_histogram_with_registry!(
                "attestation_time_gap_seconds",
                "Attestation time difference between successive updates of a feed",
                GAP_BUCKETS.to_vec(),
                registry
            )?,
            publish_time_gap: register_histogram_with_registry!(
                "publish_time_gap_seconds",
                "Publish time difference between successive updates of a feed",
                GAP_BUCKETS.to_vec(),
                registry
            )?,
            ws_interactions: register_int_counter_vec_with_registry!(
                "ws_interactions_total",
                "WebSocket interactions by kind and status",
                &["kind", "status"],
                registry
            )?,
            ws_connections: register_int_gauge_with_registry!(
                "ws_connections",
                "Open WebSocket connections",
                registry
            )?,
            listener_connected: register_int_gauge_with_registry!(
                "listener_connected",
                "1 while the gossip stream is live",
                registry
            )?,
            query_requests: register_int_counter_vec_with_registry!(
                "query_requests_total",
                "REST queries by endpoint and status",
                &["endpoint", "status"],
                registry
            )?,
        })
    }

    pub fn ws_interaction(&self, kind: &str, status: &str) {
        self.ws_interactions.with_label_values(&[kind, status]).inc();
    }

    pub fn query_request(&self, endpoint: &str, status: &str) {
        self.query_requests
            .with_label_values(&[endpoint, status])
            .inc();
    }
}

/// Text exposition of every collector in the registry
pub fn render(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
