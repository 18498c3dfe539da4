//! Shared node context
//!
//! Everything a schedule needs is handed over here at construction; there
//! is no process-global configuration or session state.

use crate::assets::{AssetFetcher, ContentUrls};
use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::ledger::LedgerGateway;
use crate::runtime::WorkloadRuntime;
use crate::session::SessionStore;
use hashnet_types::{EventSource, MachineUuid, NodeEvent, NodeEventEnvelope};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External collaborators behind their seams
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerGateway>,
    pub runtime: Arc<dyn WorkloadRuntime>,
    pub assets: Arc<dyn AssetFetcher>,
    pub session: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
}

/// Configuration, identity and collaborators shared by both schedules
#[derive(Clone)]
pub struct NodeContext {
    pub config: Arc<NodeConfig>,
    pub machine_uuid: MachineUuid,
    pub ledger: Arc<dyn LedgerGateway>,
    pub runtime: Arc<dyn WorkloadRuntime>,
    pub assets: Arc<dyn AssetFetcher>,
    pub session: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    urls: ContentUrls,
    event_tx: broadcast::Sender<NodeEventEnvelope>,
}

impl NodeContext {
    pub fn new(config: NodeConfig, machine_uuid: MachineUuid, collaborators: Collaborators) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            urls: ContentUrls::new(config.assets.ipfs_node_url.clone()),
            config: Arc::new(config),
            machine_uuid,
            ledger: collaborators.ledger,
            runtime: collaborators.runtime,
            assets: collaborators.assets,
            session: collaborators.session,
            clock: collaborators.clock,
            event_tx,
        }
    }

    pub fn urls(&self) -> &ContentUrls {
        &self.urls
    }

    pub fn gpu_present(&self) -> bool {
        self.config.host.gpu_present()
    }

    /// Subscribe to node events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Publish an event; having no subscribers is fine.
    pub fn emit(&self, source: EventSource, event: NodeEvent) {
        let envelope = NodeEventEnvelope::new(event, source, self.clock.now());
        let _ = self.event_tx.send(envelope);
    }
}
