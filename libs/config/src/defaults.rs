//! Default configuration values
//!
//! Shared by the serde defaults in [`crate::service_config`] and by tests
//! that want the production numbers without a config file.

/// Upstream gossip connection
pub mod gossip {
    pub const ENDPOINT: &str = "ws://127.0.0.1:7073/stream";

    /// First reconnect delay (milliseconds)
    pub const RECONNECT_DELAY_MS: u64 = 1_000;

    /// Reconnect delay cap (milliseconds)
    pub const MAX_RECONNECT_DELAY_MS: u64 = 10_000;

    /// Random delay added to each reconnect (milliseconds)
    pub const JITTER_MS: u64 = 250;
}

/// Ingestion pipeline
pub mod listener {
    pub const DEDUP_CAPACITY: usize = 10_000;
    pub const DEDUP_TTL_SECS: u64 = 60;

    /// Batches older than this are dropped; 0 disables the filter
    pub const IGNORE_OLDER_THAN_SECS: u64 = 300;

    pub const HISTORY_TTL_SECS: u64 = 300;
    pub const HISTORY_CLEANUP_INTERVAL_SECS: u64 = 60;
}

/// Readiness gate
pub mod readiness {
    pub const WARMUP_SECS: u64 = 30;
    pub const MIN_FEED_COUNT: usize = 1;
}

/// WebSocket and REST surface
pub mod distribution {
    pub const BIND_ADDRESS: &str = "0.0.0.0";
    pub const PORT: u16 = 4200;
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

    /// 100 KiB
    pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024;
}

/// Relay worker
pub mod relay {
    pub const MAX_BATCH_SIZE: usize = 1;
    pub const MAX_ATTEMPTS: u32 = 2;
    pub const RETRY_BASE_DELAY_MS: u64 = 0;

    /// 0 queries the payer balance once at startup only
    pub const BALANCE_QUERY_INTERVAL_MS: u64 = 0;

    pub const MAX_HEALTHY_NO_RELAY_SECS: u64 = 120;

    /// Condition wait when no balance refresh is scheduled
    pub const IDLE_WAIT_MS: u64 = 20_000;

    pub const STATUS_PORT: u16 = 4201;
}
