//! Worker behavior through the public API, driven from a gossip stream

use async_trait::async_trait;
use bytes::Bytes;
use codec::SignedMessageBuilder;
use config::RelayConfig;
use network::{BackoffConfig, ChannelGossipSource, StreamDriver};
use parking_lot::Mutex;
use prometheus::Registry;
use relay_worker::{
    AdapterError, PayerInfo, RelayAdapter, RelayFeeder, RelayResult, RelayRetcode, RelayWorker,
    RelayWorkerMetrics,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use types::{FeedId, PriceAttestation};

/// Scripted results; optionally blocks each relay until a permit is released
struct TestAdapter {
    script: Mutex<VecDeque<RelayRetcode>>,
    relayed: Mutex<Vec<Vec<Bytes>>>,
    gate: Option<Arc<Semaphore>>,
}

impl TestAdapter {
    fn new(script: Vec<RelayRetcode>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            relayed: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(Vec::new())
        }
    }

    fn relayed(&self) -> Vec<Vec<Bytes>> {
        self.relayed.lock().clone()
    }
}

#[async_trait]
impl RelayAdapter for TestAdapter {
    async fn relay(&self, messages: &[Bytes]) -> Result<RelayResult, AdapterError> {
        self.relayed.lock().push(messages.to_vec());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let code = self.script.lock().pop_front().unwrap_or(RelayRetcode::Success);
        Ok(RelayResult::new(code, Vec::new()))
    }

    async fn query(&self, _feed_id: &FeedId) -> Result<serde_json::Value, AdapterError> {
        Ok(serde_json::Value::Null)
    }

    async fn payer_info(&self) -> Result<PayerInfo, AdapterError> {
        Err(AdapterError::Payer {
            message: "no payer in tests".to_string(),
        })
    }
}

fn message(sequence: u64, ids: &[u8]) -> Bytes {
    let attestations: Vec<PriceAttestation> = ids
        .iter()
        .map(|id| PriceAttestation::new(FeedId::new([*id; 32]), sequence as i64, 1, 0, sequence as i64))
        .collect();
    SignedMessageBuilder::new(26)
        .with_sequence(sequence)
        .with_batch(&attestations)
        .unwrap()
        .build()
}

fn new_worker(adapter: Arc<TestAdapter>, config: RelayConfig) -> Arc<RelayWorker> {
    let metrics = Arc::new(RelayWorkerMetrics::new(&Registry::new()).unwrap());
    Arc::new(RelayWorker::new(adapter, &config, metrics))
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never met");
}

#[tokio::test]
async fn test_events_coalesce_while_relay_outstanding() {
    let gate = Arc::new(Semaphore::new(0));
    let adapter = Arc::new(TestAdapter::gated(gate.clone()));
    let worker = new_worker(adapter.clone(), RelayConfig::default());
    let feeder = RelayFeeder::new(worker.clone(), 100, Duration::from_secs(60));
    let task = tokio::spawn(worker.clone().run());

    feeder.handle_message(message(1, &[1]));
    wait_until(|| adapter.relayed().len() == 1).await;

    // relay of seq 1 is blocked; two newer events for the same feed set coalesce
    feeder.handle_message(message(2, &[1]));
    feeder.handle_message(message(3, &[1]));
    assert_eq!(worker.pending_len(), 1);

    gate.add_permits(2);
    wait_until(|| adapter.relayed().len() == 2).await;
    assert_eq!(adapter.relayed()[1], vec![message(3, &[1])]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(adapter.relayed().len(), 2);
    task.abort();
}

#[tokio::test]
async fn test_retry_classification_end_to_end() {
    let adapter = Arc::new(TestAdapter::new(vec![RelayRetcode::Fail, RelayRetcode::Success]));
    let worker = new_worker(adapter.clone(), RelayConfig::default());
    worker.post_event(&codec::decode_batch(message(1, &[1])).unwrap(), tokio::time::Instant::now());

    let cycle = worker.run_cycle().await.unwrap();
    assert!(cycle.outcome.result.is_ok());
    assert_eq!(cycle.outcome.attempts, 2);

    let adapter = Arc::new(TestAdapter::new(vec![RelayRetcode::AlreadyExecuted]));
    let worker = new_worker(adapter.clone(), RelayConfig::default());
    worker.post_event(&codec::decode_batch(message(1, &[1])).unwrap(), tokio::time::Instant::now());

    let cycle = worker.run_cycle().await.unwrap();
    assert_eq!(cycle.outcome.result.code, RelayRetcode::AlreadyExecuted);
    assert_eq!(cycle.outcome.attempts, 1);
    assert_eq!(adapter.relayed().len(), 1);
    assert!(!worker.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_health_transition() {
    let adapter = Arc::new(TestAdapter::new(Vec::new()));
    let config = RelayConfig {
        max_healthy_no_relay_secs: 10,
        ..RelayConfig::default()
    };
    let worker = new_worker(adapter, config);
    assert!(!worker.is_healthy());

    worker.post_event(&codec::decode_batch(message(1, &[1])).unwrap(), tokio::time::Instant::now());
    worker.run_cycle().await.unwrap();
    assert!(worker.is_healthy());

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(!worker.is_healthy());
}

#[tokio::test]
async fn test_gossip_stream_drives_worker() {
    let adapter = Arc::new(TestAdapter::new(Vec::new()));
    let worker = new_worker(adapter.clone(), RelayConfig::default());
    let feeder = Arc::new(RelayFeeder::new(worker.clone(), 100, Duration::from_secs(60)));
    let (source, gossip) = ChannelGossipSource::new();
    let driver = StreamDriver::new(Arc::new(source), BackoffConfig::from_millis(10, 10, 0));

    let feed_task = feeder.spawn(driver);
    let worker_task = tokio::spawn(worker.clone().run());
    wait_until(|| feeder.is_connected()).await;

    let raw = message(1, &[1, 2]);
    gossip.send(raw.clone());
    gossip.send(raw.clone());
    wait_until(|| worker.is_healthy()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(adapter.relayed(), vec![vec![raw]]);

    feed_task.abort();
    worker_task.abort();
}
