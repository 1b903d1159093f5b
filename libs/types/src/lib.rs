//! # Pricewire Types
//!
//! Shared data model for the price service and the relay worker.
//!
//! ## Contents
//!
//! - [`FeedId`]: 32-byte feed identifier with strict hex parsing
//! - [`PriceAttestation`] / [`BatchAttestation`]: decoded contents of a signed message
//! - [`PriceInfo`]: latest stored value of a feed, plus its JSON rendering
//! - [`time`]: unix clock helpers
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{FeedId, PriceAttestation, RenderOptions};
//!
//! let id: FeedId = "0x0101010101010101010101010101010101010101010101010101010101010101"
//!     .parse()
//!     .unwrap();
//! let attestation = PriceAttestation::new(id, 4200, 3, -2, 1_700_000_000);
//! assert_eq!(attestation.feed_id.to_string().len(), 64);
//! let _ = RenderOptions { verbose: true, binary: false };
//! ```

pub mod attestation;
pub mod feed_id;
pub mod price_info;
pub mod time;

pub use attestation::{BatchAttestation, PriceAttestation, PriceStatus};
pub use feed_id::{join_ids, FeedId, FeedIdError, FEED_ID_LEN};
pub use price_info::{PriceFeedJson, PriceFeedMetadata, PriceInfo, PriceJson, RenderOptions};
