//! Prometheus collectors for the relay worker

use crate::adapter::RelayRetcode;
use prometheus::{
    register_gauge_with_registry, register_histogram_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Gauge,
    Histogram, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Receive-to-complete buckets in milliseconds
const COMPLETE_TIME_BUCKETS: &[f64] = &[
    100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0,
];

#[derive(Debug, Clone)]
pub struct RelayWorkerMetrics {
    pub successes: IntCounter,
    /// Every non-success, non-already-executed result
    pub failures: IntCounter,
    pub already_executed: IntCounter,
    pub timeouts: IntCounter,
    pub seq_num_mismatch: IntCounter,
    pub insufficient_funds: IntCounter,
    pub retries: IntCounter,
    pub retries_exceeded: IntCounter,
    pub last_sequence: IntGauge,
    pub complete_time_ms: Histogram,
    pub payer_balance: Gauge,
    pub pending_events: IntGauge,
}

impl RelayWorkerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            successes: register_int_counter_with_registry!(
                "relay_successes_total",
                "Relay cycles that ended in success",
                registry
            )?,
            failures: register_int_counter_with_registry!(
                "relay_failures_total",
                "Relay cycles that ended in a failure code",
                registry
            )?,
            already_executed: register_int_counter_with_registry!(
                "relay_already_executed_total",
                "Messages the destination chain had already executed",
                registry
            )?,
            timeouts: register_int_counter_with_registry!(
                "relay_timeouts_total",
                "Relay cycles that ended in a timeout",
                registry
            )?,
            seq_num_mismatch: register_int_counter_with_registry!(
                "relay_seq_num_mismatch_total",
                "Relay cycles that ended in a payer sequence mismatch",
                registry
            )?,
            insufficient_funds: register_int_counter_with_registry!(
                "relay_insufficient_funds_total",
                "Relay cycles rejected for insufficient payer funds",
                registry
            )?,
            retries: register_int_counter_with_registry!(
                "relay_retries_total",
                "Relay attempts beyond the first",
                registry
            )?,
            retries_exceeded: register_int_counter_with_registry!(
                "relay_retries_exceeded_total",
                "Cycles that ran out of attempts",
                registry
            )?,
            last_sequence: register_int_gauge_with_registry!(
                "relay_last_sequence",
                "Sequence number of the last finalized message",
                registry
            )?,
            complete_time_ms: register_histogram_with_registry!(
                "relay_complete_time_ms",
                "Time from receiving a message to finishing its relay",
                COMPLETE_TIME_BUCKETS.to_vec(),
                registry
            )?,
            payer_balance: register_gauge_with_registry!(
                "payer_balance",
                "Balance of the relay payer account",
                registry
            )?,
            pending_events: register_int_gauge_with_registry!(
                "pending_events",
                "Batch keys waiting to be relayed",
                registry
            )?,
        })
    }

    /// Count one finalized message by its result code
    pub fn record_result(&self, code: RelayRetcode) {
        match code {
            RelayRetcode::Success => self.successes.inc(),
            RelayRetcode::AlreadyExecuted => self.already_executed.inc(),
            RelayRetcode::Timeout => {
                self.timeouts.inc();
                self.failures.inc();
            }
            RelayRetcode::SeqNumMismatch => {
                self.seq_num_mismatch.inc();
                self.failures.inc();
            }
            RelayRetcode::InsufficientFunds => {
                self.insufficient_funds.inc();
                self.failures.inc();
            }
            RelayRetcode::Fail | RelayRetcode::Other(_) => self.failures.inc(),
        }
    }
}

pub fn render(registry: &Registry) -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
