//! # Listener
//!
//! Turns the upstream gossip stream into store updates.
//!
//! ## Pipeline
//!
//! ```text
//! raw ─► dedup (content digest) ─► decode ─► age filter ─► batch freshness
//!        short-circuit ─► per-feed upsert ─► observers
//! ```
//!
//! Every drop along the way is counted and, except for decode failures,
//! logged at debug level only. The connection itself is owned by a
//! [`StreamDriver`]; the listener only sees messages and state changes.
//!
//! ## Readiness
//!
//! Ready once the current streaming session has lasted the warm-up period
//! and the store holds the minimum number of feeds. Never ready while
//! disconnected.

use crate::history::PublishTimeHistory;
use crate::metrics::PriceServiceMetrics;
use crate::store::{MessageOrigin, PriceStore};
use bytes::Bytes;
use codec::{batch_summary, decode_batch, message_digest, DedupWindow};
use config::{ListenerConfig, ReadinessConfig};
use network::{StreamDriver, StreamHandler, StreamState, StreamStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Same bytes seen within the dedup window
    Duplicate,
    DecodeFailed,
    /// Batch carries no attestations
    Empty,
    /// Older than the configured age cutoff
    TooOld,
    /// No feed in the batch is newer than stored
    Stale,
    /// `updated` feeds were stored and announced
    Applied { updated: usize },
}

pub struct Listener {
    store: Arc<PriceStore>,
    history: Arc<PublishTimeHistory>,
    dedup: Mutex<DedupWindow>,
    ignore_older_than: Option<Duration>,
    readiness: ReadinessConfig,
    status: StreamStatus,
    metrics: Arc<PriceServiceMetrics>,
}

impl Listener {
    pub fn new(
        store: Arc<PriceStore>,
        history: Arc<PublishTimeHistory>,
        config: &ListenerConfig,
        readiness: ReadinessConfig,
        status: StreamStatus,
        metrics: Arc<PriceServiceMetrics>,
    ) -> Self {
        Self {
            store,
            history,
            dedup: Mutex::new(DedupWindow::new(config.dedup_capacity, config.dedup_ttl())),
            ignore_older_than: config.ignore_older_than(),
            readiness,
            status,
            metrics,
        }
    }

    /// Drive `driver` with this listener as its handler
    pub fn spawn(self: &Arc<Self>, driver: StreamDriver) -> JoinHandle<()> {
        let handler: Arc<dyn StreamHandler> = self.clone();
        tokio::spawn(driver.run(handler))
    }

    pub fn process_message(&self, raw: Bytes) -> ProcessOutcome {
        self.process_message_at(raw, types::time::unix_now_secs())
    }

    /// Same as [`Listener::process_message`] with an explicit clock (unix seconds)
    pub fn process_message_at(&self, raw: Bytes, now: i64) -> ProcessOutcome {
        self.metrics.messages_received.inc();

        let digest = message_digest(&raw);
        if !self.dedup.lock().check_and_mark(digest, Instant::now()) {
            self.metrics.messages_duplicate.inc();
            debug!("Dropping duplicate message {}", digest);
            return ProcessOutcome::Duplicate;
        }

        let batch = match decode_batch(raw) {
            Ok(batch) => batch,
            Err(e) => {
                self.metrics.messages_decode_failed.inc();
                error!("Failed to decode message {}: {}", digest, e);
                return ProcessOutcome::DecodeFailed;
            }
        };

        let Some(attestation_time) = batch.attestation_time() else {
            return ProcessOutcome::Empty;
        };
        if let Some(max_age) = self.ignore_older_than {
            if attestation_time < now - max_age.as_secs() as i64 {
                self.metrics.messages_too_old.inc();
                debug!(
                    "Dropping batch seq {} attested at {}, older than {}s",
                    batch.sequence,
                    attestation_time,
                    max_age.as_secs()
                );
                return ProcessOutcome::TooOld;
            }
        }

        if !batch.attestations.iter().any(|a| self.store.is_newer(a)) {
            self.metrics.messages_stale.inc();
            debug!("Skipping batch seq {}: no feed is newer than stored", batch.sequence);
            return ProcessOutcome::Stale;
        }

        let origin = MessageOrigin {
            raw: batch.raw.clone(),
            sequence: batch.sequence,
            emitter_chain: batch.emitter_chain,
            receive_time: now,
        };
        let summary = batch_summary(&batch);
        let mut updated = 0;
        for attestation in batch.attestations {
            if let Some(info) = self.store.upsert(attestation, &origin) {
                self.history
                    .insert(info.feed_id(), info.publish_time(), origin.raw.clone());
                updated += 1;
            }
        }

        info!(
            "Parsed a new batch price attestation: chain {}, seq {}, updated {} feed(s), summary: {}",
            origin.emitter_chain, origin.sequence, updated, summary
        );
        ProcessOutcome::Applied { updated }
    }

    pub fn is_ready(&self) -> bool {
        let Some(streaming_for) = self.status.streaming_for() else {
            return false;
        };
        streaming_for >= self.readiness.warmup()
            && self.store.feed_count() >= self.readiness.min_feed_count
    }

    pub fn stream_state(&self) -> StreamState {
        self.status.state()
    }
}

impl StreamHandler for Listener {
    fn on_message(&self, raw: Bytes) {
        self.process_message(raw);
    }

    fn on_state_change(&self, state: StreamState) {
        self.metrics
            .listener_connected
            .set(i64::from(state == StreamState::Streaming));
    }
}
