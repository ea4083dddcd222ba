use std::sync::Arc;
use std::time::Duration;

use node_rpc::{Endpoint, NodePool};
use store::{FileHeightCache, MemoryStore};
use stream::Subscription;
use sync::registry::refresh_from_chain;
use sync::{
    BackfillConfig, BlockHeightTracker, BlockPipeline, ChainSource, CheckpointConfig,
    CheckpointEventProcessor, CheckpointLifecycleEngine, EventDispatchRegistry,
    MemoryValidatorRegistry, MissedRangeProcessor, NewBlockProcessor, NodeRouter,
    PruningBoundaries, TrackerConfig, ValidatorSignatureTracker,
};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::orchestrator::{NetworkStream, OrchestratorConfig, StreamOrchestrator};

/// Wires the ingestion components together and runs them until ctrl-c.
pub struct Node {
    config: RuntimeConfig,
}

impl Node {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(networks = self.config.networks.len(), "starting indexer");
        std::fs::create_dir_all(&self.config.datadir)?;

        let mut router = NodeRouter::new();
        for net in &self.config.networks {
            let endpoints = net
                .rpc_urls
                .iter()
                .zip(&net.rest_urls)
                .map(|(rpc, rest)| Endpoint {
                    rpc_url: rpc.clone(),
                    rest_url: rest.clone(),
                })
                .collect();
            router.insert(NodePool::new(&net.name, endpoints)?);
        }
        let chain: Arc<dyn ChainSource> = Arc::new(router);

        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(FileHeightCache::in_dir(&self.config.datadir));
        info!(path = %cache.path().display(), "height cache");
        let registry = Arc::new(MemoryValidatorRegistry::new());
        let boundaries = Arc::new(PruningBoundaries::new());

        let checkpoints = Arc::new(CheckpointLifecycleEngine::new(
            chain.clone(),
            store.clone(),
            registry.clone(),
            boundaries.clone(),
            CheckpointConfig::default(),
        ));
        let pipeline = Arc::new(BlockPipeline::new(
            Arc::new(ValidatorSignatureTracker::new(store.clone())),
            checkpoints.clone(),
            self.config.checkpoint_sync,
        ));
        let backfill = Arc::new(MissedRangeProcessor::new(
            chain.clone(),
            pipeline,
            boundaries,
            BackfillConfig {
                historical_sync_blocks: self.config.historical_sync_blocks,
                ..BackfillConfig::default()
            },
        ));
        let tracker = Arc::new(BlockHeightTracker::new(
            backfill,
            cache,
            TrackerConfig {
                height_cache_ttl: self.config.height_cache_ttl,
            },
        ));

        let mut dispatch = EventDispatchRegistry::new();
        dispatch.register(Arc::new(NewBlockProcessor::new(tracker.clone())));
        let mut subscriptions = vec![Subscription::new_blocks()];
        if self.config.checkpoint_sync {
            dispatch.register(Arc::new(CheckpointEventProcessor::new(checkpoints.clone())));
            subscriptions.push(Subscription::checkpoint_events());
        }

        let network_names: Vec<String> =
            self.config.networks.iter().map(|n| n.name.clone()).collect();
        for network in &network_names {
            refresh_from_chain(chain.as_ref(), &registry, network).await;
        }
        let refresher = spawn_registry_refresher(
            chain.clone(),
            registry,
            network_names,
            self.config.registry_refresh_interval,
        );

        let streams = self
            .config
            .networks
            .iter()
            .map(|n| NetworkStream {
                name: n.name.clone(),
                urls: n.stream_urls.clone(),
            })
            .collect();
        let orchestrator = Arc::new(StreamOrchestrator::new(
            streams,
            subscriptions,
            Arc::new(dispatch),
            tracker,
            self.config.checkpoint_sync.then_some(checkpoints),
            OrchestratorConfig {
                reconnect_interval: self.config.reconnect_interval,
                max_reconnect_attempts: self.config.max_reconnect_attempts,
            },
        ));
        orchestrator.start_listening().await;

        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        orchestrator.stop().await;
        refresher.abort();
        Ok(())
    }
}

/// Reload every network's validator set on a fixed interval.
pub fn spawn_registry_refresher(
    chain: Arc<dyn ChainSource>,
    registry: Arc<MemoryValidatorRegistry>,
    networks: Vec<String>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // The first tick fires immediately; startup already refreshed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for network in &networks {
                refresh_from_chain(chain.as_ref(), &registry, network).await;
            }
        }
    })
}
