//! Point-in-time reads over the store and publish-time history
//!
//! Every call that takes a list of ids fails as a whole when any id is
//! unknown, and the error names only the unknown ids.

use crate::history::{HistoryEntry, PublishTimeHistory};
use crate::store::PriceStore;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;
use types::{join_ids, FeedId, PriceInfo};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Price Feed(s) with id(s) {} not found.", join_ids(.0))]
    FeedsNotFound(Vec<FeedId>),

    #[error("No message with publish time {publish_time} or later for price feed {id}")]
    MessageNotFound { id: FeedId, publish_time: i64 },
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// A feed whose latest attestation lags the local clock
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StaleFeed {
    pub id: FeedId,
    pub attestation_time: i64,
    /// Seconds behind `now`
    pub lag: i64,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<PriceStore>,
    history: Arc<PublishTimeHistory>,
}

impl QueryService {
    pub fn new(store: Arc<PriceStore>, history: Arc<PublishTimeHistory>) -> Self {
        Self { store, history }
    }

    /// Latest value of each requested feed, one entry per id
    pub fn latest_price_feeds(&self, ids: &[FeedId]) -> Result<Vec<PriceInfo>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.store.latest(id) {
                Some(info) => found.push(info),
                None if !missing.contains(id) => missing.push(*id),
                None => {}
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(QueryError::FeedsNotFound(missing))
        }
    }

    /// Distinct signed messages backing the requested feeds, in first-occurrence order
    pub fn latest_raw_messages(&self, ids: &[FeedId]) -> Result<Vec<Bytes>> {
        let infos = self.latest_price_feeds(ids)?;
        let mut seen = HashSet::with_capacity(infos.len());
        Ok(infos
            .into_iter()
            .filter(|info| seen.insert(info.raw.clone()))
            .map(|info| info.raw)
            .collect())
    }

    /// Message with exactly `publish_time`, or the first one published after it
    pub fn raw_message_at(&self, id: &FeedId, publish_time: i64) -> Result<HistoryEntry> {
        if !self.store.contains(id) {
            return Err(QueryError::FeedsNotFound(vec![*id]));
        }
        self.history
            .lookup(id, publish_time)
            .ok_or(QueryError::MessageNotFound {
                id: *id,
                publish_time,
            })
    }

    /// Historical value of a feed, decoded from the message found by
    /// [`raw_message_at`](Self::raw_message_at). `receive_time` stamps the
    /// rebuilt entry.
    pub fn price_feed_at(&self, id: &FeedId, publish_time: i64, receive_time: i64) -> Result<PriceInfo> {
        let entry = self.raw_message_at(id, publish_time)?;
        let not_found = QueryError::MessageNotFound {
            id: *id,
            publish_time,
        };
        let batch = match codec::decode_batch(entry.raw) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to decode historical message for {}: {}", id, e);
                return Err(not_found);
            }
        };
        let Some(attestation) = batch.attestations.iter().find(|a| a.feed_id == *id).cloned() else {
            return Err(not_found);
        };
        Ok(PriceInfo {
            attestation,
            sequence: batch.sequence,
            emitter_chain: batch.emitter_chain,
            raw: batch.raw,
            receive_time,
        })
    }

    pub fn price_feed_ids(&self) -> Vec<FeedId> {
        let mut ids: Vec<FeedId> = self.store.all_feed_ids().into_iter().collect();
        ids.sort();
        ids
    }

    /// Feeds whose attestation time is more than `threshold_secs` behind `now`
    pub fn stale_feeds(&self, now: i64, threshold_secs: i64) -> Vec<StaleFeed> {
        let mut stale: Vec<StaleFeed> = self
            .store
            .snapshot()
            .into_iter()
            .filter_map(|info| {
                let lag = now - info.attestation_time();
                (lag > threshold_secs).then(|| StaleFeed {
                    id: info.feed_id(),
                    attestation_time: info.attestation_time(),
                    lag,
                })
            })
            .collect();
        stale.sort_by(|a, b| b.lag.cmp(&a.lag).then(a.id.cmp(&b.id)));
        stale
    }

    /// [`stale_feeds`](Self::stale_feeds) as a `{ "<id>": lag }` object
    pub fn stale_feed_lags(&self, now: i64, threshold_secs: i64) -> BTreeMap<String, i64> {
        self.stale_feeds(now, threshold_secs)
            .into_iter()
            .map(|feed| (feed.id.to_hex(), feed.lag))
            .collect()
    }
}
