//! The attendance node.

use std::sync::Arc;

use presence_nullables::NullStore;
use presence_store::PresenceStore;
use presence_store_lmdb::LmdbStore;
use presence_types::{Clock, SystemClock, UserId};
use presence_verification::{EventBus, StaticDirectory, VerificationOrchestrator};
use presence_rpc::{RpcMetrics, RpcServer, RpcState};
use presence_websocket::{NotificationHub, WebSocketServer};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{NodeConfig, StoreBackend};
use crate::shutdown::ShutdownController;
use crate::NodeError;

const NOTICE_CHANNEL_CAPACITY: usize = 1024;

pub struct PresenceNode {
    config: NodeConfig,
    store: Arc<dyn PresenceStore>,
    orchestrator: Arc<VerificationOrchestrator>,
    hub: Arc<NotificationHub>,
    metrics: Arc<RpcMetrics>,
    shutdown: ShutdownController,
}

impl PresenceNode {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the node on an explicit clock.
    pub fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        let seed = config.geofence.seed()?;
        let store = open_store(&config)?;

        let directory: StaticDirectory = config
            .principals
            .iter()
            .map(|p| (UserId::new(p.user_id.as_str()), p.role))
            .collect();
        info!(principals = directory.len(), "role directory loaded");

        let hub = Arc::new(NotificationHub::new(NOTICE_CHANNEL_CAPACITY));
        let mut events = EventBus::new();
        events.subscribe(Box::new(|notice| {
            debug!(event = notice.name(), room = %notice.room(), "attendance notice");
            Ok(())
        }));
        events.subscribe(hub.listener());

        let orchestrator = VerificationOrchestrator::new(
            Arc::clone(&store),
            clock,
            Arc::new(directory),
            &config.pipeline,
            seed,
            events,
        )?;
        let geofence = orchestrator.geofence();
        info!(
            backend = %config.backend,
            revision = geofence.revision,
            radius_m = geofence.radius_m,
            "verification pipeline ready"
        );

        Ok(Self {
            config,
            store,
            orchestrator: Arc::new(orchestrator),
            hub,
            metrics: Arc::new(RpcMetrics::new()?),
            shutdown: ShutdownController::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn PresenceStore> {
        Arc::clone(&self.store)
    }

    pub fn orchestrator(&self) -> Arc<VerificationOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn hub(&self) -> Arc<NotificationHub> {
        Arc::clone(&self.hub)
    }

    pub fn rpc_state(&self) -> RpcState {
        RpcState::new(Arc::clone(&self.orchestrator), Arc::clone(&self.metrics))
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Run the enabled servers until SIGINT/SIGTERM, a programmatic shutdown,
    /// or a server failure. Servers drain in-flight requests before returning.
    pub async fn run(&self) -> Result<(), NodeError> {
        let mut servers: JoinSet<Result<(), NodeError>> = JoinSet::new();

        if self.config.enable_rpc {
            let server = RpcServer::new(self.config.rpc_port, self.rpc_state());
            let stop = self.shutdown.signal();
            servers.spawn(async move { server.start(stop).await.map_err(NodeError::from) });
        }
        if self.config.enable_websocket {
            let server = WebSocketServer::new(self.config.websocket_port, self.hub());
            let stop = self.shutdown.signal();
            servers.spawn(async move { server.start(stop).await.map_err(NodeError::from) });
        }
        info!(
            rpc = self.config.enable_rpc,
            rpc_port = self.config.rpc_port,
            websocket = self.config.enable_websocket,
            websocket_port = self.config.websocket_port,
            "node running"
        );

        let early_exit = tokio::select! {
            _ = ShutdownController::wait_for_os_signal() => None,
            _ = self.shutdown.signal() => None,
            Some(joined) = servers.join_next(), if !servers.is_empty() => Some(joined),
        };
        self.shutdown.shutdown();

        let mut first_error = match early_exit {
            Some(Ok(Ok(()))) => {
                warn!("a server exited before shutdown");
                None
            }
            Some(Ok(Err(e))) => Some(e),
            Some(Err(e)) => Some(NodeError::Task(e.to_string())),
            None => None,
        };
        while let Some(joined) = servers.join_next().await {
            let result = joined.map_err(|e| NodeError::Task(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        info!("node stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn PresenceStore>, NodeError> {
    match config.backend {
        StoreBackend::Lmdb => {
            let path = config.data_dir.join("lmdb");
            let store = LmdbStore::open(&path, config.lmdb_map_size)?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("in-memory backend: records are lost when the node stops");
            Ok(Arc::new(NullStore::new()))
        }
    }
}
