//! Status surface: `/status`, `/health`, `/query/<feed id>`, `/metrics`

use crate::error::{RelayWorkerError, Result};
use crate::metrics;
use crate::worker::RelayWorker;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::FeedId;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

pub fn routes(
    worker: Arc<RelayWorker>,
    registry: Registry,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let with_worker = warp::any().map(move || worker.clone());

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_worker.clone())
        .map(|worker: Arc<RelayWorker>| warp::reply::json(&worker.status()).into_response());

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_worker.clone())
        .map(|worker: Arc<RelayWorker>| {
            if worker.is_healthy() {
                warp::reply::with_status("OK", StatusCode::OK).into_response()
            } else {
                warp::reply::with_status("Service Unavailable", StatusCode::SERVICE_UNAVAILABLE)
                    .into_response()
            }
        });

    let query = warp::path!("query" / String)
        .and(warp::get())
        .and(with_worker)
        .then(|id: String, worker: Arc<RelayWorker>| async move { query_price(&worker, &id).await });

    let metrics = warp::path!("metrics").and(warp::get()).map(move || {
        warp::reply::with_header(
            metrics::render(&registry),
            "content-type",
            prometheus::TEXT_FORMAT,
        )
        .into_response()
    });

    status
        .or(health)
        .unify()
        .or(query)
        .unify()
        .or(metrics)
        .unify()
}

async fn query_price(worker: &RelayWorker, id: &str) -> Response {
    let feed_id: FeedId = match id.parse() {
        Ok(feed_id) => feed_id,
        Err(e) => {
            return warp::reply::with_status(e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
    };
    match worker.query_price(&feed_id).await {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => {
            warn!("Price query for {} failed: {}", feed_id, e);
            warp::reply::with_status(e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
    }
}

/// Bind the status server and serve in the background
pub fn start(worker: Arc<RelayWorker>, registry: Registry, port: u16) -> Result<(SocketAddr, JoinHandle<()>)> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let (bound, server) = warp::serve(routes(worker, registry))
        .try_bind_ephemeral(addr)
        .map_err(|e| RelayWorkerError::BindAddress {
            message: format!("{}: {}", addr, e),
        })?;
    info!("Status server listening on {}", bound);
    Ok((bound, tokio::spawn(server)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RelayWorkerMetrics;
    use crate::retry::tests::ScriptedAdapter;
    use bytes::Bytes;
    use config::RelayConfig;
    use tokio::time::Instant;
    use types::{BatchAttestation, PriceAttestation};

    fn setup() -> (Arc<RelayWorker>, Registry) {
        let registry = Registry::new();
        let metrics = Arc::new(RelayWorkerMetrics::new(&registry).unwrap());
        let worker = Arc::new(RelayWorker::new(
            Arc::new(ScriptedAdapter::default()),
            &RelayConfig::default(),
            metrics,
        ));
        (worker, registry)
    }

    async fn get(worker: &Arc<RelayWorker>, registry: &Registry, path: &str) -> (StatusCode, String) {
        let response = warp::test::request()
            .method("GET")
            .path(path)
            .reply(&routes(worker.clone(), registry.clone()))
            .await;
        (
            response.status(),
            String::from_utf8_lossy(response.body()).into_owned(),
        )
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let (worker, registry) = setup();
        assert_eq!(get(&worker, &registry, "/health").await.0, StatusCode::SERVICE_UNAVAILABLE);

        let batch = BatchAttestation {
            attestations: vec![PriceAttestation::new(FeedId::new([1; 32]), 5, 1, 0, 10)],
            raw: Bytes::from_static(b"vaa"),
            sequence: 3,
            emitter_chain: 26,
        };
        worker.post_event(&batch, Instant::now());
        worker.run_cycle().await.unwrap();

        assert_eq!(get(&worker, &registry, "/health").await.0, StatusCode::OK);
        let (status, body) = get(&worker, &registry, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json[0]["relay_cycles"], 1);
        assert_eq!(json[0]["last_result"]["code"], "Success");

        let (_, body) = get(&worker, &registry, "/metrics").await;
        assert!(body.contains("relay_successes_total 1"));
    }

    #[tokio::test]
    async fn test_query() {
        let (worker, registry) = setup();
        let id = FeedId::new([0xab; 32]);
        let (status, body) = get(&worker, &registry, &format!("/query/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&id.to_hex()));

        assert_eq!(get(&worker, &registry, "/query/nope").await.0, StatusCode::BAD_REQUEST);
    }
}
