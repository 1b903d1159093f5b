//! Gossip stream to worker events
//!
//! Drops byte-identical re-deliveries, decodes the rest and posts each
//! non-empty batch to the [`RelayWorker`]. Coalescing by batch key happens
//! in the worker.

use crate::worker::RelayWorker;
use bytes::Bytes;
use codec::{decode_batch, message_digest, DedupWindow};
use network::{StreamDriver, StreamHandler, StreamState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct RelayFeeder {
    worker: Arc<RelayWorker>,
    dedup: Mutex<DedupWindow>,
    connected: AtomicBool,
}

impl RelayFeeder {
    pub fn new(worker: Arc<RelayWorker>, dedup_capacity: usize, dedup_ttl: Duration) -> Self {
        Self {
            worker,
            dedup: Mutex::new(DedupWindow::new(dedup_capacity, dedup_ttl)),
            connected: AtomicBool::new(false),
        }
    }

    pub fn spawn(self: &Arc<Self>, driver: StreamDriver) -> JoinHandle<()> {
        let handler: Arc<dyn StreamHandler> = self.clone();
        tokio::spawn(driver.run(handler))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Returns true when the message was posted to the worker
    pub fn handle_message(&self, raw: Bytes) -> bool {
        let digest = message_digest(&raw);
        if !self.dedup.lock().check_and_mark(digest, Instant::now()) {
            debug!("Dropping duplicate message {}", digest);
            return false;
        }

        let batch = match decode_batch(raw) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to decode message {}: {}", digest, e);
                return false;
            }
        };
        if batch.is_empty() {
            debug!("Ignoring empty batch seq {}", batch.sequence);
            return false;
        }

        self.worker.post_event(&batch, tokio::time::Instant::now());
        true
    }
}

impl StreamHandler for RelayFeeder {
    fn on_message(&self, raw: Bytes) {
        self.handle_message(raw);
    }

    fn on_state_change(&self, state: StreamState) {
        let streaming = state == StreamState::Streaming;
        if self.connected.swap(streaming, Ordering::Relaxed) != streaming {
            info!("Gossip feed {}", if streaming { "connected" } else { "disconnected" });
        }
    }
}
