//! # Price Store
//!
//! Latest-value map from feed id to [`PriceInfo`], plus the observers that are
//! told about every accepted update.
//!
//! ## Ordering
//!
//! An update is accepted only when its attestation time is strictly greater
//! than the stored one, so the stored attestation time of a feed never goes
//! backwards. The freshness check, the write and the observer fanout run
//! under one upsert lock: two racing updates for a feed are applied and
//! announced in the same order.
//!
//! Readers take a short read lock on the map and clone the entry, so queries
//! run concurrently with ingestion and never see a partial value.
//!
//! ## Observers
//!
//! Observers run synchronously on the ingesting task while the upsert lock
//! is held. They must not block; anything slow has to be handed off to a
//! queue or channel.

use crate::metrics::PriceServiceMetrics;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use types::{FeedId, PriceAttestation, PriceInfo};

/// Receives every accepted update
pub trait PriceObserver: Send + Sync {
    fn on_price_update(&self, info: &PriceInfo);
}

/// Where an attestation came from
#[derive(Debug, Clone)]
pub struct MessageOrigin {
    pub raw: Bytes,
    pub sequence: u64,
    pub emitter_chain: u16,
    /// Unix seconds
    pub receive_time: i64,
}

pub struct PriceStore {
    prices: RwLock<HashMap<FeedId, PriceInfo>>,
    upsert_lock: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn PriceObserver>>>,
    metrics: Arc<PriceServiceMetrics>,
}

impl PriceStore {
    pub fn new(metrics: Arc<PriceServiceMetrics>) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            upsert_lock: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
            metrics,
        }
    }

    pub fn latest(&self, id: &FeedId) -> Option<PriceInfo> {
        self.prices.read().get(id).cloned()
    }

    pub fn contains(&self, id: &FeedId) -> bool {
        self.prices.read().contains_key(id)
    }

    pub fn all_feed_ids(&self) -> HashSet<FeedId> {
        self.prices.read().keys().copied().collect()
    }

    pub fn feed_count(&self) -> usize {
        self.prices.read().len()
    }

    /// Snapshot of every stored entry
    pub fn snapshot(&self) -> Vec<PriceInfo> {
        self.prices.read().values().cloned().collect()
    }

    pub fn subscribe(&self, observer: Arc<dyn PriceObserver>) {
        self.observers.write().push(observer);
    }

    /// Whether `attestation` would replace the stored value
    pub fn is_newer(&self, attestation: &PriceAttestation) -> bool {
        match self.prices.read().get(&attestation.feed_id) {
            Some(current) => attestation.attestation_time > current.attestation_time(),
            None => true,
        }
    }

    /// Store `attestation` if it is fresher than the current value and
    /// notify observers. Returns the stored info when accepted.
    pub fn upsert(&self, attestation: PriceAttestation, origin: &MessageOrigin) -> Option<PriceInfo> {
        let _serialized = self.upsert_lock.lock();

        let previous = self.latest(&attestation.feed_id);
        if let Some(current) = &previous {
            if attestation.attestation_time <= current.attestation_time() {
                debug!(
                    "Ignoring stale update for {}: attestation time {} <= stored {}",
                    attestation.feed_id,
                    attestation.attestation_time,
                    current.attestation_time()
                );
                return None;
            }
        }

        let info = PriceInfo {
            attestation,
            sequence: origin.sequence,
            emitter_chain: origin.emitter_chain,
            raw: origin.raw.clone(),
            receive_time: origin.receive_time,
        };
        self.prices.write().insert(info.feed_id(), info.clone());

        self.metrics.price_updates.inc();
        if let Some(previous) = previous {
            self.metrics
                .attestation_time_gap
                .observe((info.attestation_time() - previous.attestation_time()) as f64);
            self.metrics
                .publish_time_gap
                .observe((info.publish_time() - previous.publish_time()) as f64);
        }

        // Cloned so an observer may subscribe further observers without deadlocking
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.on_price_update(&info);
        }

        Some(info)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prometheus::Registry;

    pub(crate) fn test_metrics() -> Arc<PriceServiceMetrics> {
        Arc::new(PriceServiceMetrics::new(&Registry::new()).unwrap())
    }

    pub(crate) fn origin(sequence: u64) -> MessageOrigin {
        MessageOrigin {
            raw: Bytes::from(sequence.to_be_bytes().to_vec()),
            sequence,
            emitter_chain: 26,
            receive_time: 1_000,
        }
    }

    #[derive(Default)]
    pub(crate) struct Recorder {
        pub(crate) seen: Mutex<Vec<PriceInfo>>,
    }

    impl PriceObserver for Recorder {
        fn on_price_update(&self, info: &PriceInfo) {
            self.seen.lock().push(info.clone());
        }
    }

    fn attestation(time: i64) -> PriceAttestation {
        PriceAttestation::new(FeedId::new([0xaa; 32]), time * 10, 1, -2, time)
    }

    #[test]
    fn test_first_sighting_inserts_and_notifies() {
        let store = PriceStore::new(test_metrics());
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        let info = store.upsert(attestation(100), &origin(1)).unwrap();
        assert_eq!(info.sequence, 1);
        assert_eq!(store.feed_count(), 1);
        assert_eq!(store.latest(&FeedId::new([0xaa; 32])), Some(info));
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[test]
    fn test_equal_or_older_never_overwrites() {
        let store = PriceStore::new(test_metrics());
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        store.upsert(attestation(100), &origin(1)).unwrap();
        assert!(store.upsert(attestation(100), &origin(2)).is_none());
        assert!(store.upsert(attestation(90), &origin(3)).is_none());

        let stored = store.latest(&FeedId::new([0xaa; 32])).unwrap();
        assert_eq!(stored.attestation_time(), 100);
        assert_eq!(stored.sequence, 1);
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[test]
    fn test_is_newer() {
        let store = PriceStore::new(test_metrics());
        assert!(store.is_newer(&attestation(5)));
        store.upsert(attestation(5), &origin(1));
        assert!(!store.is_newer(&attestation(5)));
        assert!(store.is_newer(&attestation(6)));
    }

    #[test]
    fn test_gap_metrics_recorded_on_update() {
        let metrics = test_metrics();
        let store = PriceStore::new(metrics.clone());
        store.upsert(attestation(100), &origin(1));
        store.upsert(attestation(103), &origin(2));

        assert_eq!(metrics.price_updates.get(), 2);
        assert_eq!(metrics.attestation_time_gap.get_sample_count(), 1);
        assert_eq!(metrics.attestation_time_gap.get_sample_sum(), 3.0);
    }

    proptest::proptest! {
        #[test]
        fn prop_stored_time_is_running_max(times in proptest::collection::vec(0i64..1_000, 1..50)) {
            let store = PriceStore::new(test_metrics());
            let mut max = i64::MIN;
            for (seq, time) in times.iter().enumerate() {
                store.upsert(attestation(*time), &origin(seq as u64));
                max = max.max(*time);
                let stored = store.latest(&FeedId::new([0xaa; 32])).unwrap();
                proptest::prop_assert_eq!(stored.attestation_time(), max);
            }
        }
    }
}
