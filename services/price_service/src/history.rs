//! Recent signed messages per feed, indexed by publish time
//!
//! Backs `get_vaa`: a lookup returns the message with exactly the requested
//! publish time, or the first one published after it. Requests older than the
//! oldest retained entry find nothing rather than a much later message.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use types::FeedId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub publish_time: i64,
    pub raw: Bytes,
}

#[derive(Debug)]
pub struct PublishTimeHistory {
    entries: RwLock<HashMap<FeedId, BTreeMap<i64, Bytes>>>,
    ttl: Duration,
}

impl PublishTimeHistory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, id: FeedId, publish_time: i64, raw: Bytes) {
        self.entries
            .write()
            .entry(id)
            .or_default()
            .insert(publish_time, raw);
    }

    pub fn lookup(&self, id: &FeedId, publish_time: i64) -> Option<HistoryEntry> {
        let entries = self.entries.read();
        let feed = entries.get(id)?;
        let (&oldest, _) = feed.first_key_value()?;
        if publish_time < oldest {
            return None;
        }
        feed.range(publish_time..)
            .next()
            .map(|(&publish_time, raw)| HistoryEntry {
                publish_time,
                raw: raw.clone(),
            })
    }

    /// Drop entries whose age relative to `now` (unix seconds) has reached the TTL
    pub fn cleanup(&self, now: i64) -> usize {
        let cutoff = now - self.ttl.as_secs() as i64;
        let mut removed = 0;
        let mut entries = self.entries.write();
        entries.retain(|_, feed| {
            let keep = feed.split_off(&(cutoff + 1));
            removed += feed.len();
            *feed = keep;
            !feed.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired entries
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let history = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = history.cleanup(types::time::unix_now_secs());
                if removed > 0 {
                    debug!("Purged {} expired history entries", removed);
                }
            }
        })
    }
}
