//! Wiring of the price service components

use crate::distribution::SubscriptionRegistry;
use crate::error::Result;
use crate::history::PublishTimeHistory;
use crate::listener::Listener;
use crate::metrics::PriceServiceMetrics;
use crate::query::QueryService;
use crate::rest::RestApi;
use crate::server::DistributionServer;
use crate::store::PriceStore;
use config::ServiceConfig;
use network::{BackoffConfig, GossipSource, StreamDriver};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct PriceService {
    pub store: Arc<PriceStore>,
    pub history: Arc<PublishTimeHistory>,
    pub listener: Arc<Listener>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub query: QueryService,
    pub metrics: Arc<PriceServiceMetrics>,
    server: DistributionServer,
    driver: StreamDriver,
    history_cleanup_interval: Duration,
}

impl PriceService {
    pub fn new(config: &ServiceConfig, source: Arc<dyn GossipSource>, registry: Registry) -> Result<Self> {
        let metrics = Arc::new(PriceServiceMetrics::new(&registry)?);
        let store = Arc::new(PriceStore::new(metrics.clone()));
        let history = Arc::new(PublishTimeHistory::new(Duration::from_secs(
            config.listener.history_ttl_secs,
        )));

        let gossip = &config.gossip;
        let driver = StreamDriver::new(
            source,
            BackoffConfig::from_millis(
                gossip.reconnect_delay_ms,
                gossip.max_reconnect_delay_ms,
                gossip.jitter_ms,
            ),
        );
        let listener = Arc::new(Listener::new(
            store.clone(),
            history.clone(),
            &config.listener,
            config.readiness.clone(),
            driver.status(),
            metrics.clone(),
        ));

        let subscriptions = SubscriptionRegistry::attach(store.clone(), metrics.clone());
        let query = QueryService::new(store.clone(), history.clone());
        let rest = Arc::new(RestApi::new(
            query.clone(),
            listener.clone(),
            registry,
            metrics.clone(),
        ));
        let server = DistributionServer::new(config.distribution.clone(), subscriptions.clone(), rest);

        Ok(Self {
            store,
            history,
            listener,
            subscriptions,
            query,
            metrics,
            server,
            driver,
            history_cleanup_interval: Duration::from_secs(config.listener.history_cleanup_interval_secs),
        })
    }

    /// Bind the server and start every background task
    pub fn start(self) -> Result<RunningPriceService> {
        let (addr, server) = self.server.start()?;
        let heartbeat = self.server.start_heartbeat_task();
        let cleanup = self.history.spawn_cleanup(self.history_cleanup_interval);
        let listener = self.listener.spawn(self.driver);
        info!("Price service started on {}", addr);

        Ok(RunningPriceService {
            addr,
            store: self.store,
            subscriptions: self.subscriptions,
            listener: self.listener,
            query: self.query,
            tasks: RunningTasks {
                listener,
                server,
                heartbeat,
                cleanup,
            },
        })
    }
}

struct RunningTasks {
    listener: JoinHandle<()>,
    server: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

pub struct RunningPriceService {
    pub addr: SocketAddr,
    pub store: Arc<PriceStore>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub listener: Arc<Listener>,
    pub query: QueryService,
    tasks: RunningTasks,
}

impl RunningPriceService {
    /// Wait until any background task ends
    pub async fn wait(self) {
        let RunningTasks {
            listener,
            server,
            heartbeat,
            cleanup,
        } = self.tasks;

        tokio::select! {
            result = listener => {
                if let Err(e) = result {
                    error!("Listener task failed: {}", e);
                }
            }
            result = server => {
                if let Err(e) = result {
                    error!("Distribution server failed: {}", e);
                }
            }
            result = heartbeat => {
                if let Err(e) = result {
                    error!("Heartbeat task failed: {}", e);
                }
            }
            result = cleanup => {
                if let Err(e) = result {
                    error!("History cleanup task failed: {}", e);
                }
            }
        }
    }

    pub fn shutdown(self) {
        self.tasks.listener.abort();
        self.tasks.server.abort();
        self.tasks.heartbeat.abort();
        self.tasks.cleanup.abort();
    }
}
