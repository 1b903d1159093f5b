//! # REST Surface
//!
//! Stateless HTTP reads mounted next to the WebSocket endpoint.
//!
//! | Route | Answer |
//! |---|---|
//! | `GET /api/latest_price_feeds?ids[]=..&verbose=&binary=` | price feed objects |
//! | `GET /api/latest_vaas?ids[]=..&encoding=base64\|hex` | distinct signed messages |
//! | `GET /api/get_vaa?id=&publish_time=&encoding=` | `{"publishTime","vaa"}` |
//! | `GET /api/get_vaa_ccip?data=0x<id><publish_time>` | `{"data": "0x<vaa hex>"}` |
//! | `GET /api/get_price_feed?id=&publish_time=&verbose=&binary=` | historical price feed |
//! | `GET /api/price_feed_ids` | every known feed id |
//! | `GET /api/stale_feeds?threshold=<secs>` | lagging feeds |
//! | `GET /ready`, `GET /live` | probes |
//! | `GET /metrics` | prometheus text |
//!
//! Unknown ids answer 400 with the not-found message; a missing history
//! entry answers 404, except on `get_vaa_ccip` where it answers 502 so
//! CCIP-read clients retry. Both `ids[]=` and `ids=` are accepted.

use crate::listener::Listener;
use crate::metrics::{self, PriceServiceMetrics};
use crate::query::{QueryError, QueryService};
use base64::Engine;
use bytes::Bytes;
use prometheus::Registry;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use types::{FeedId, RenderOptions};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

const CCIP_DATA_LEN: usize = 40;

const ENDPOINTS: &[&str] = &[
    "/api/latest_price_feeds?ids[]=<price_feed_id>&ids[]=<price_feed_id_2>&..(&verbose=true)(&binary=true)",
    "/api/latest_vaas?ids[]=<price_feed_id>&ids[]=<price_feed_id_2>&..(&encoding=hex|base64)",
    "/api/get_vaa?id=<price_feed_id>&publish_time=<publish_time_in_unix_timestamp>(&encoding=hex|base64)",
    "/api/get_vaa_ccip?data=<0x<price_feed_id_32_bytes>+<publish_time_unix_timestamp_be_8_bytes>>",
    "/api/get_price_feed?id=<price_feed_id>&publish_time=<publish_time_in_unix_timestamp>(&verbose=true)(&binary=true)",
    "/api/price_feed_ids",
    "/api/stale_feeds?threshold=<staleness_threshold_seconds>",
    "/ready",
    "/live",
    "/metrics",
];

/// Answers the readiness probe
pub trait ReadinessCheck: Send + Sync {
    fn is_ready(&self) -> bool;
}

impl ReadinessCheck for Listener {
    fn is_ready(&self) -> bool {
        Listener::is_ready(self)
    }
}

#[derive(Debug, Error)]
pub enum RestError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// History miss on the CCIP endpoint
    #[error("VAA not found.")]
    VaaUnavailable,
}

impl RestError {
    fn status(&self) -> StatusCode {
        match self {
            RestError::BadRequest(_) | RestError::Query(QueryError::FeedsNotFound(_)) => {
                StatusCode::BAD_REQUEST
            }
            RestError::Query(QueryError::MessageNotFound { .. }) => StatusCode::NOT_FOUND,
            RestError::VaaUnavailable => StatusCode::BAD_GATEWAY,
        }
    }

    fn into_response(self) -> Response {
        let status = self.status();
        warp::reply::with_status(self.to_string(), status).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Base64,
    Hex,
}

impl Encoding {
    fn encode(self, raw: &Bytes) -> String {
        match self {
            Encoding::Base64 => base64::engine::general_purpose::STANDARD.encode(raw),
            Encoding::Hex => hex::encode(raw),
        }
    }
}

/// Decoded `application/x-www-form-urlencoded` query string
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn parse(raw: &str) -> Self {
        Self(url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &str) -> Result<&str, RestError> {
        self.get(name)
            .ok_or_else(|| RestError::BadRequest(format!("\"{}\" is required", name)))
    }

    fn feed_id(value: &str) -> Result<FeedId, RestError> {
        value
            .parse()
            .map_err(|e| RestError::BadRequest(format!("{}", e)))
    }

    fn ids(&self) -> Result<Vec<FeedId>, RestError> {
        let ids = self
            .0
            .iter()
            .filter(|(key, _)| key == "ids[]" || key == "ids")
            .map(|(_, value)| Self::feed_id(value))
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Err(RestError::BadRequest("\"ids\" is required".to_string()));
        }
        Ok(ids)
    }

    fn flag(&self, name: &str) -> Result<bool, RestError> {
        match self.get(name) {
            None | Some("false") | Some("0") => Ok(false),
            Some("true") | Some("1") | Some("") => Ok(true),
            Some(other) => Err(RestError::BadRequest(format!(
                "\"{}\" must be a boolean, got {}",
                name, other
            ))),
        }
    }

    fn integer(&self, name: &str) -> Result<i64, RestError> {
        let value = self.required(name)?;
        value
            .parse()
            .map_err(|_| RestError::BadRequest(format!("\"{}\" must be an integer, got {}", name, value)))
    }

    /// `0x`-prefixed 32-byte feed id followed by an 8-byte big-endian publish time
    fn ccip_data(&self) -> Result<(FeedId, i64), RestError> {
        let value = self.required("data")?;
        let invalid = || {
            RestError::BadRequest(format!(
                "\"data\" must be 0x followed by 80 hex digits, got {}",
                value
            ))
        };
        let digits = value.strip_prefix("0x").ok_or_else(invalid)?;
        let bytes = hex::decode(digits).map_err(|_| invalid())?;
        if bytes.len() != CCIP_DATA_LEN {
            return Err(invalid());
        }
        let (id, time) = bytes.split_at(32);
        let mut id_bytes = [0u8; 32];
        id_bytes.copy_from_slice(id);
        let mut time_bytes = [0u8; 8];
        time_bytes.copy_from_slice(time);
        Ok((FeedId::new(id_bytes), i64::from_be_bytes(time_bytes)))
    }

    fn encoding(&self) -> Result<Encoding, RestError> {
        match self.get("encoding") {
            None | Some("base64") => Ok(Encoding::Base64),
            Some("hex") => Ok(Encoding::Hex),
            Some(other) => Err(RestError::BadRequest(format!(
                "\"encoding\" must be one of hex, base64, got {}",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
struct VaaResponse {
    #[serde(rename = "publishTime")]
    publish_time: i64,
    vaa: String,
}

#[derive(Serialize)]
struct CcipResponse {
    data: String,
}

pub struct RestApi {
    query: QueryService,
    readiness: Arc<dyn ReadinessCheck>,
    registry: Registry,
    metrics: Arc<PriceServiceMetrics>,
}

impl RestApi {
    pub fn new(
        query: QueryService,
        readiness: Arc<dyn ReadinessCheck>,
        registry: Registry,
        metrics: Arc<PriceServiceMetrics>,
    ) -> Self {
        Self {
            query,
            readiness,
            registry,
            metrics,
        }
    }

    /// Record the outcome under `endpoint` and render it
    fn respond(&self, endpoint: &str, result: Result<Response, RestError>) -> Response {
        match result {
            Ok(response) => {
                self.metrics.query_request(endpoint, "ok");
                response
            }
            Err(e) => {
                debug!("Rejected {} request: {}", endpoint, e);
                self.metrics.query_request(endpoint, "err");
                e.into_response()
            }
        }
    }

    pub fn latest_price_feeds(&self, raw_query: &str) -> Response {
        let result = self.try_latest_price_feeds(&QueryParams::parse(raw_query));
        self.respond("latest_price_feeds", result)
    }

    fn try_latest_price_feeds(&self, params: &QueryParams) -> Result<Response, RestError> {
        let ids = params.ids()?;
        let options = RenderOptions {
            verbose: params.flag("verbose")?,
            binary: params.flag("binary")?,
        };
        let feeds: Vec<_> = self
            .query
            .latest_price_feeds(&ids)?
            .iter()
            .map(|info| info.to_price_feed(options))
            .collect();
        Ok(warp::reply::json(&feeds).into_response())
    }

    pub fn latest_vaas(&self, raw_query: &str) -> Response {
        let result = self.try_latest_vaas(&QueryParams::parse(raw_query));
        self.respond("latest_vaas", result)
    }

    fn try_latest_vaas(&self, params: &QueryParams) -> Result<Response, RestError> {
        let ids = params.ids()?;
        let encoding = params.encoding()?;
        let vaas: Vec<String> = self
            .query
            .latest_raw_messages(&ids)?
            .iter()
            .map(|raw| encoding.encode(raw))
            .collect();
        Ok(warp::reply::json(&vaas).into_response())
    }

    pub fn get_vaa(&self, raw_query: &str) -> Response {
        let result = self.try_get_vaa(&QueryParams::parse(raw_query));
        self.respond("get_vaa", result)
    }

    fn try_get_vaa(&self, params: &QueryParams) -> Result<Response, RestError> {
        let id = QueryParams::feed_id(params.required("id")?)?;
        let publish_time = params.integer("publish_time")?;
        let encoding = params.encoding()?;
        let entry = self.query.raw_message_at(&id, publish_time)?;
        let reply = VaaResponse {
            publish_time: entry.publish_time,
            vaa: encoding.encode(&entry.raw),
        };
        Ok(warp::reply::json(&reply).into_response())
    }

    pub fn get_vaa_ccip(&self, raw_query: &str) -> Response {
        let result = self.try_get_vaa_ccip(&QueryParams::parse(raw_query));
        self.respond("get_vaa_ccip", result)
    }

    fn try_get_vaa_ccip(&self, params: &QueryParams) -> Result<Response, RestError> {
        let (id, publish_time) = params.ccip_data()?;
        let entry = match self.query.raw_message_at(&id, publish_time) {
            Ok(entry) => entry,
            Err(QueryError::MessageNotFound { .. }) => return Err(RestError::VaaUnavailable),
            Err(e) => return Err(e.into()),
        };
        let reply = CcipResponse {
            data: format!("0x{}", hex::encode(&entry.raw)),
        };
        Ok(warp::reply::json(&reply).into_response())
    }

    pub fn get_price_feed(&self, raw_query: &str, now: i64) -> Response {
        let result = self.try_get_price_feed(&QueryParams::parse(raw_query), now);
        self.respond("get_price_feed", result)
    }

    fn try_get_price_feed(&self, params: &QueryParams, now: i64) -> Result<Response, RestError> {
        let id = QueryParams::feed_id(params.required("id")?)?;
        let publish_time = params.integer("publish_time")?;
        let options = RenderOptions {
            verbose: params.flag("verbose")?,
            binary: params.flag("binary")?,
        };
        let info = self.query.price_feed_at(&id, publish_time, now)?;
        Ok(warp::reply::json(&info.to_price_feed(options)).into_response())
    }

    pub fn price_feed_ids(&self) -> Response {
        let ids = self.query.price_feed_ids();
        self.respond("price_feed_ids", Ok(warp::reply::json(&ids).into_response()))
    }

    pub fn stale_feeds(&self, raw_query: &str, now: i64) -> Response {
        let result = QueryParams::parse(raw_query)
            .integer("threshold")
            .map(|threshold| {
                warp::reply::json(&self.query.stale_feed_lags(now, threshold)).into_response()
            });
        self.respond("stale_feeds", result)
    }

    pub fn ready(&self) -> Response {
        if self.readiness.is_ready() {
            warp::reply::with_status("OK", StatusCode::OK).into_response()
        } else {
            warp::reply::with_status("Service Unavailable", StatusCode::SERVICE_UNAVAILABLE)
                .into_response()
        }
    }

    pub fn metrics(&self) -> Response {
        warp::reply::with_header(
            metrics::render(&self.registry),
            "content-type",
            prometheus::TEXT_FORMAT,
        )
        .into_response()
    }
}

/// Every REST route, ready to be combined with the WebSocket route
pub fn routes(
    api: Arc<RestApi>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let with_api = warp::any().map(move || api.clone());
    let query = warp::query::raw()
        .or(warp::any().map(String::new))
        .unify();

    let latest_price_feeds = warp::path!("api" / "latest_price_feeds")
        .and(warp::get())
        .and(with_api.clone())
        .and(query.clone())
        .map(|api: Arc<RestApi>, q: String| api.latest_price_feeds(&q));

    let latest_vaas = warp::path!("api" / "latest_vaas")
        .and(warp::get())
        .and(with_api.clone())
        .and(query.clone())
        .map(|api: Arc<RestApi>, q: String| api.latest_vaas(&q));

    let get_vaa = warp::path!("api" / "get_vaa")
        .and(warp::get())
        .and(with_api.clone())
        .and(query.clone())
        .map(|api: Arc<RestApi>, q: String| api.get_vaa(&q));

    let get_vaa_ccip = warp::path!("api" / "get_vaa_ccip")
        .and(warp::get())
        .and(with_api.clone())
        .and(query.clone())
        .map(|api: Arc<RestApi>, q: String| api.get_vaa_ccip(&q));

    let get_price_feed = warp::path!("api" / "get_price_feed")
        .and(warp::get())
        .and(with_api.clone())
        .and(query.clone())
        .map(|api: Arc<RestApi>, q: String| api.get_price_feed(&q, types::time::unix_now_secs()));

    let price_feed_ids = warp::path!("api" / "price_feed_ids")
        .and(warp::get())
        .and(with_api.clone())
        .map(|api: Arc<RestApi>| api.price_feed_ids());

    let stale_feeds = warp::path!("api" / "stale_feeds")
        .and(warp::get())
        .and(with_api.clone())
        .and(query)
        .map(|api: Arc<RestApi>, q: String| api.stale_feeds(&q, types::time::unix_now_secs()));

    let ready = warp::path!("ready")
        .and(warp::get())
        .and(with_api.clone())
        .map(|api: Arc<RestApi>| api.ready());

    let live = warp::path!("live")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK).into_response());

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_api)
        .map(|api: Arc<RestApi>| api.metrics());

    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&ENDPOINTS).into_response());

    latest_price_feeds
        .or(latest_vaas)
        .unify()
        .or(get_vaa)
        .unify()
        .or(get_vaa_ccip)
        .unify()
        .or(get_price_feed)
        .unify()
        .or(price_feed_ids)
        .unify()
        .or(stale_feeds)
        .unify()
        .or(ready)
        .unify()
        .or(live)
        .unify()
        .or(metrics)
        .unify()
        .or(index)
        .unify()
}
