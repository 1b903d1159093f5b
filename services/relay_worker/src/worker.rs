//! # Relay Worker
//!
//! Single consumer that coalesces incoming batches by batch key and relays
//! them through a [`RelayAdapter`].
//!
//! ## Cycle
//!
//! ```text
//! WAIT ──(event | balance timer)──► DRAIN ≤ max_batch_size keys
//!   ▲                                   │
//!   │                                   ▼
//!   └──(queue empty)── FINALIZE ◄── RELAY (retrying, lock released)
//! ```
//!
//! ## Coalescing
//!
//! The pending queue holds at most one event per batch key. Posting an event
//! for a queued key replaces the queued event in place, so only the last
//! event posted before a drain is relayed. Draining removes the key, and the
//! next event for it starts a new cycle.
//!
//! ## Locking
//!
//! Pending events, product records and the last-success time share one
//! mutex. It is released while the adapter runs and re-taken to finalize, so
//! events keep arriving and coalescing during a slow relay.

use crate::adapter::{RelayAdapter, RelayResult};
use crate::metrics::RelayWorkerMetrics;
use crate::retry::{relay_with_retry, RelayOutcome, RetryPolicy};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use codec::{batch_key, batch_summary, Digest};
use config::RelayConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info};
use types::{BatchAttestation, FeedId};

/// Floor for the wait when a balance refresh is already due
const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub raw: Bytes,
    pub sequence: u64,
    pub summary: String,
    pub receive_time: Instant,
}

/// Relay history of one batch key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub batch_key: Digest,
    pub summary: String,
    pub relay_cycles: u64,
    pub total_attempts: u64,
    pub last_time_published: Option<DateTime<Utc>>,
    pub last_result: Option<RelayResult>,
}

impl ProductRecord {
    fn new(batch_key: Digest, summary: String) -> Self {
        Self {
            batch_key,
            summary,
            relay_cycles: 0,
            total_attempts: 0,
            last_time_published: None,
            last_result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStatus {
    pub batch_key: String,
    pub summary: String,
    pub relay_cycles: u64,
    pub total_attempts: u64,
    pub last_time_published: Option<String>,
    pub last_result: Option<RelayResult>,
}

impl From<&ProductRecord> for ProductStatus {
    fn from(record: &ProductRecord) -> Self {
        Self {
            batch_key: record.batch_key.to_hex(),
            summary: record.summary.clone(),
            relay_cycles: record.relay_cycles,
            total_attempts: record.total_attempts,
            last_time_published: record.last_time_published.map(|t| t.to_rfc3339()),
            last_result: record.last_result.clone(),
        }
    }
}

/// What one draining cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub keys: Vec<Digest>,
    pub relayed: Vec<Bytes>,
    pub outcome: RelayOutcome,
}

#[derive(Default)]
struct WorkerState {
    /// Keys in arrival order; each key appears once
    order: VecDeque<Digest>,
    pending: HashMap<Digest, PendingEvent>,
    products: HashMap<Digest, ProductRecord>,
    last_success: Option<Instant>,
    next_balance_query: Option<Instant>,
}

pub struct RelayWorker {
    adapter: Arc<dyn RelayAdapter>,
    state: Mutex<WorkerState>,
    wake: Notify,
    max_batch_size: usize,
    retry: RetryPolicy,
    balance_query_interval: Option<Duration>,
    max_healthy_no_relay: Duration,
    idle_wait: Duration,
    metrics: Arc<RelayWorkerMetrics>,
}

impl RelayWorker {
    pub fn new(adapter: Arc<dyn RelayAdapter>, config: &RelayConfig, metrics: Arc<RelayWorkerMetrics>) -> Self {
        Self {
            adapter,
            state: Mutex::new(WorkerState::default()),
            wake: Notify::new(),
            max_batch_size: config.max_batch_size.max(1),
            retry: RetryPolicy::new(config.max_attempts, config.retry_base_delay()),
            balance_query_interval: config.balance_query_interval(),
            max_healthy_no_relay: config.max_healthy_no_relay(),
            idle_wait: config.idle_wait(),
            metrics,
        }
    }

    /// Queue `batch` for relay, replacing any queued event with the same key
    pub fn post_event(&self, batch: &BatchAttestation, receive_time: Instant) -> Digest {
        let key = batch_key(batch);
        let event = PendingEvent {
            raw: batch.raw.clone(),
            sequence: batch.sequence,
            summary: batch_summary(batch),
            receive_time,
        };

        {
            let mut state = self.state.lock();
            debug!("Posting event with key {}, seq {}", key, event.sequence);
            if state.pending.insert(key, event).is_none() {
                state.order.push_back(key);
            }
            self.metrics.pending_events.set(state.order.len() as i64);
        }
        self.wake.notify_one();
        key
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().order.len()
    }

    /// Take up to `max_batch_size` keys off the queue
    pub fn drain(&self) -> Vec<(Digest, PendingEvent)> {
        let mut state = self.state.lock();
        let mut drained = Vec::new();
        while drained.len() < self.max_batch_size {
            let Some(key) = state.order.pop_front() else {
                break;
            };
            let Some(event) = state.pending.remove(&key) else {
                continue;
            };

            let record = state
                .products
                .entry(key)
                .or_insert_with(|| ProductRecord::new(key, event.summary.clone()));
            debug!(
                "Processing update {} for {}, seq {}",
                record.relay_cycles, key, event.sequence
            );
            record.summary = event.summary.clone();
            record.last_time_published = Some(Utc::now());
            drained.push((key, event));
        }
        self.metrics.pending_events.set(state.order.len() as i64);
        drained
    }

    /// Drain, relay and finalize once. `None` when nothing was pending.
    pub async fn run_cycle(&self) -> Option<CycleOutcome> {
        let drained = self.drain();
        if drained.is_empty() {
            return None;
        }

        let messages: Vec<Bytes> = drained.iter().map(|(_, event)| event.raw.clone()).collect();
        debug!("Relaying {} event(s)", messages.len());
        let send_time = Instant::now();
        let outcome = relay_with_retry(self.adapter.as_ref(), &messages, self.retry, &self.metrics).await;

        self.finalize(&drained, &outcome, send_time);
        Some(CycleOutcome {
            keys: drained.iter().map(|(key, _)| *key).collect(),
            relayed: messages,
            outcome,
        })
    }

    fn finalize(&self, drained: &[(Digest, PendingEvent)], outcome: &RelayOutcome, send_time: Instant) {
        let mut state = self.state.lock();
        let complete_time = Instant::now();

        for (key, event) in drained {
            self.metrics.record_result(outcome.result.code);
            self.metrics.last_sequence.set(event.sequence as i64);
            let receive_to_complete = complete_time.saturating_duration_since(event.receive_time);
            self.metrics
                .complete_time_ms
                .observe(receive_to_complete.as_millis() as f64);

            let Some(record) = state.products.get_mut(key) else {
                continue;
            };
            record.relay_cycles += 1;
            record.total_attempts += u64::from(outcome.attempts);
            record.last_result = Some(outcome.result.clone());

            info!(
                "Complete: seq {}, price ids {}, receive to send {:?}, receive to complete {:?}, cycles {}, attempts {}, result {}",
                event.sequence,
                event.summary,
                send_time.saturating_duration_since(event.receive_time),
                receive_to_complete,
                record.relay_cycles,
                outcome.attempts,
                outcome.result.code
            );
        }

        if outcome.result.is_ok() {
            state.last_success = Some(complete_time);
        }
    }

    /// True once a relay succeeded and the last success is recent enough
    pub fn is_healthy(&self) -> bool {
        self.state
            .lock()
            .last_success
            .is_some_and(|last| last.elapsed() <= self.max_healthy_no_relay)
    }

    pub fn status(&self) -> Vec<ProductStatus> {
        let state = self.state.lock();
        let mut status: Vec<ProductStatus> = state.products.values().map(ProductStatus::from).collect();
        status.sort_by(|a, b| a.batch_key.cmp(&b.batch_key));
        status
    }

    pub fn product(&self, key: &Digest) -> Option<ProductRecord> {
        self.state.lock().products.get(key).cloned()
    }

    /// On-chain value of a feed; does not touch worker state
    pub async fn query_price(&self, feed_id: &FeedId) -> Result<serde_json::Value, crate::adapter::AdapterError> {
        self.adapter.query(feed_id).await
    }

    /// Query the payer once and arm the refresh timer
    pub async fn initialize(&self) {
        match self.adapter.payer_info().await {
            Ok(payer) => {
                match self.balance_query_interval {
                    Some(every) => info!(
                        "Initial payer balance is {}, will query every {:?}",
                        payer.balance, every
                    ),
                    None => info!("Initial payer balance is {}", payer.balance),
                }
                self.metrics.payer_balance.set(payer.balance as f64);
            }
            Err(e) => error!("Failed to query payer balance: {}", e),
        }
        if let Some(every) = self.balance_query_interval {
            self.state.lock().next_balance_query = Some(Instant::now() + every);
        }
    }

    /// Refresh the payer balance when the timer is due
    pub async fn update_balance(&self) {
        let Some(every) = self.balance_query_interval else {
            return;
        };
        let now = Instant::now();
        let due = self
            .state
            .lock()
            .next_balance_query
            .map_or(true, |next| now >= next);
        if !due {
            return;
        }

        match self.adapter.payer_info().await {
            Ok(payer) => {
                info!("Payer {} balance: {}", payer.address, payer.balance);
                self.metrics.payer_balance.set(payer.balance as f64);
            }
            Err(e) => error!("Failed to query payer balance: {}", e),
        }
        self.state.lock().next_balance_query = Some(now + every);
    }

    /// How long to wait for an event before doing periodic work
    pub fn wait_timeout(&self) -> Duration {
        if self.balance_query_interval.is_none() {
            return self.idle_wait;
        }
        match self.state.lock().next_balance_query {
            Some(next) => next.saturating_duration_since(Instant::now()).max(MIN_WAIT),
            None => MIN_WAIT,
        }
    }

    /// Run forever
    pub async fn run(self: Arc<Self>) {
        info!(
            "Relaying each message at most {} times, {:?} base retry delay, up to {} keys per batch",
            self.retry.max_attempts, self.retry.base_delay, self.max_batch_size
        );
        self.initialize().await;

        loop {
            self.update_balance().await;
            while self.run_cycle().await.is_some() {
                self.update_balance().await;
            }
            let _ = tokio::time::timeout(self.wait_timeout(), self.wake.notified()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RelayRetcode;
    use crate::retry::tests::ScriptedAdapter;
    use prometheus::Registry;
    use types::PriceAttestation;

    fn batch(ids: &[u8], time: i64, sequence: u64) -> BatchAttestation {
        let attestations = ids
            .iter()
            .map(|id| PriceAttestation::new(FeedId::new([*id; 32]), time, 1, 0, time))
            .collect();
        BatchAttestation {
            attestations,
            raw: Bytes::from(format!("vaa-{}", sequence)),
            sequence,
            emitter_chain: 26,
        }
    }

    fn worker_with(adapter: Arc<ScriptedAdapter>, config: RelayConfig) -> (RelayWorker, Arc<RelayWorkerMetrics>) {
        let metrics = Arc::new(RelayWorkerMetrics::new(&Registry::new()).unwrap());
        (RelayWorker::new(adapter, &config, metrics.clone()), metrics)
    }

    fn worker(adapter: Arc<ScriptedAdapter>) -> (RelayWorker, Arc<RelayWorkerMetrics>) {
        worker_with(adapter, RelayConfig::default())
    }

    #[tokio::test]
    async fn test_same_key_coalesces_to_latest() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (worker, _) = worker(adapter.clone());

        worker.post_event(&batch(&[1, 2], 10, 1), Instant::now());
        worker.post_event(&batch(&[2, 1], 11, 2), Instant::now());
        assert_eq!(worker.pending_len(), 1);

        let cycle = worker.run_cycle().await.unwrap();
        assert_eq!(cycle.relayed, vec![Bytes::from("vaa-2")]);
        assert!(worker.run_cycle().await.is_none());
        assert_eq!(adapter.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_replacement_keeps_queue_position() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (worker, _) = worker(adapter.clone());

        worker.post_event(&batch(&[1], 10, 1), Instant::now());
        worker.post_event(&batch(&[2], 10, 2), Instant::now());
        worker.post_event(&batch(&[1], 11, 3), Instant::now());

        let first = worker.run_cycle().await.unwrap();
        assert_eq!(first.relayed, vec![Bytes::from("vaa-3")]);
        let second = worker.run_cycle().await.unwrap();
        assert_eq!(second.relayed, vec![Bytes::from("vaa-2")]);
    }

    #[tokio::test]
    async fn test_drain_respects_batch_size() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let config = RelayConfig {
            max_batch_size: 2,
            ..RelayConfig::default()
        };
        let (worker, metrics) = worker_with(adapter.clone(), config);
        for (id, seq) in [(1, 1), (2, 2), (3, 3)] {
            worker.post_event(&batch(&[id], 10, seq), Instant::now());
        }
        assert_eq!(metrics.pending_events.get(), 3);

        let cycle = worker.run_cycle().await.unwrap();
        assert_eq!(cycle.keys.len(), 2);
        assert_eq!(worker.pending_len(), 1);
        assert_eq!(adapter.calls.lock()[0].len(), 2);
        assert_eq!(metrics.successes.get(), 2);
    }

    #[tokio::test]
    async fn test_drained_key_can_be_queued_again() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (worker, _) = worker(adapter.clone());
        let key = worker.post_event(&batch(&[1], 10, 1), Instant::now());
        let drained = worker.drain();
        assert_eq!(drained.len(), 1);

        worker.post_event(&batch(&[1], 11, 2), Instant::now());
        assert_eq!(worker.pending_len(), 1);
        assert_eq!(worker.product(&key).unwrap().relay_cycles, 0);
    }

    #[tokio::test]
    async fn test_finalize_updates_record() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            Ok(RelayRetcode::Fail),
            Ok(RelayRetcode::Success),
        ]));
        let (worker, metrics) = worker(adapter);
        let key = worker.post_event(&batch(&[1], 10, 7), Instant::now());
        worker.run_cycle().await.unwrap();

        let record = worker.product(&key).unwrap();
        assert_eq!(record.relay_cycles, 1);
        assert_eq!(record.total_attempts, 2);
        assert!(record.last_result.unwrap().is_ok());
        assert!(record.last_time_published.is_some());
        assert_eq!(metrics.last_sequence.get(), 7);

        let status = worker.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].batch_key, key.to_hex());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_follows_last_success() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(RelayRetcode::Fail), Ok(RelayRetcode::Fail)]));
        let (worker, _) = worker(adapter);
        assert!(!worker.is_healthy());

        worker.post_event(&batch(&[1], 10, 1), Instant::now());
        worker.run_cycle().await.unwrap();
        assert!(!worker.is_healthy(), "failed cycles do not count");

        worker.post_event(&batch(&[1], 11, 2), Instant::now());
        worker.run_cycle().await.unwrap();
        assert!(worker.is_healthy());

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(worker.is_healthy());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!worker.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_tracks_balance_refresh() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (idle, _) = worker(adapter.clone());
        assert_eq!(idle.wait_timeout(), Duration::from_millis(20_000));

        let config = RelayConfig {
            balance_query_interval_ms: 5_000,
            ..RelayConfig::default()
        };
        let (worker, metrics) = worker_with(adapter, config);
        worker.initialize().await;
        assert_eq!(metrics.payer_balance.get(), 1_000.0);
        assert_eq!(worker.wait_timeout(), Duration::from_millis(5_000));

        tokio::time::advance(Duration::from_millis(2_000)).await;
        assert_eq!(worker.wait_timeout(), Duration::from_millis(3_000));
        tokio::time::advance(Duration::from_millis(4_000)).await;
        assert_eq!(worker.wait_timeout(), MIN_WAIT);

        worker.update_balance().await;
        assert_eq!(worker.wait_timeout(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_wakes_on_post() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (worker, _) = worker(adapter.clone());
        let worker = Arc::new(worker);
        let task = tokio::spawn(worker.clone().run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        worker.post_event(&batch(&[1], 10, 1), Instant::now());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(adapter.calls.lock().len(), 1);
        assert!(worker.is_healthy());
        task.abort();
    }
}
