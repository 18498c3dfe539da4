//! Node lifecycle: startup registration, the two schedules, shutdown and
//! decommissioning.

use crate::assets::HttpAssetFetcher;
use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, NodeConfig};
use crate::context::{Collaborators, NodeContext};
use crate::controller::OrderLifecycleController;
use crate::error::{NodeError, NodeResult};
use crate::heartbeat::HeartbeatScheduler;
use crate::ledger::{InMemoryLedger, LedgerGateway, RelayLedgerGateway};
use crate::runtime::DockerCliRuntime;
use crate::session::JsonFileSessionStore;
use hashnet_types::{AccountRef, EventSource, MachineUuid, NodeEvent, Receipt, SessionKey};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Build the production collaborators described by `config`.
pub async fn build_context(config: NodeConfig) -> NodeResult<NodeContext> {
    let machine_uuid: MachineUuid = config
        .host
        .machine_uuid
        .parse()
        .map_err(|e| NodeError::Config(format!("host.machine_uuid: {}", e)))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let ledger: Arc<dyn LedgerGateway> = match &config.ledger {
        LedgerConfig::Memory => {
            warn!("Using the in-memory ledger; nothing is submitted to the marketplace");
            Arc::new(InMemoryLedger::new(
                AccountRef::new(format!("machine-{}", machine_uuid.to_hex())),
                clock.clone(),
            ))
        }
        LedgerConfig::Relay { url } => {
            Arc::new(RelayLedgerGateway::connect(url.clone(), machine_uuid).await?)
        }
    };

    let session = JsonFileSessionStore::open(config.session.path.clone()).await?;
    let runtime = DockerCliRuntime::new(config.runtime.clone(), config.assets.workspace_dir());

    Ok(NodeContext::new(
        config,
        machine_uuid,
        Collaborators {
            ledger,
            runtime: Arc::new(runtime),
            assets: Arc::new(HttpAssetFetcher::new()),
            session: Arc::new(session),
            clock,
        },
    ))
}

/// A host node
pub struct Node {
    ctx: NodeContext,
}

impl Node {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Benchmark the host and register the machine if the ledger does not
    /// know it yet. Returns the registration receipt when one was submitted.
    #[instrument(skip_all, fields(uuid = %self.ctx.machine_uuid))]
    pub async fn register(&self) -> NodeResult<Option<Receipt>> {
        if let Some(dir) = &self.ctx.config.assets.model_create_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let score = self.ctx.runtime.run_score(self.ctx.gpu_present()).await?;

        let machine = self.ctx.ledger.fetch_machine().await?;
        if machine.as_ref().is_some_and(|m| m.is_registered()) {
            info!(machine = %self.ctx.ledger.machine_account(), "Machine already exists");
            return Ok(None);
        }

        info!(machine = %self.ctx.ledger.machine_account(), score, "Machine does not exist, registering");
        let payload = self.registration_payload(score)?;
        let receipt = self.ctx.ledger.register_machine(&payload).await?;
        info!(signature = %receipt, confirmed = true, "Machine registered");
        self.ctx.emit(
            EventSource::Node,
            NodeEvent::MachineRegistered {
                receipt: receipt.clone(),
            },
        );
        Ok(Some(receipt))
    }

    /// Operator-supplied hardware description stamped with identity and score.
    fn registration_payload(&self, score: f64) -> NodeResult<String> {
        let mut payload: Map<String, Value> = self
            .ctx
            .config
            .host
            .registration
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        payload.insert(
            "MachineUUID".to_string(),
            Value::String(self.ctx.machine_uuid.to_hex()),
        );
        payload.insert(
            "MachineAccounts".to_string(),
            Value::String(self.ctx.ledger.machine_account().to_string()),
        );
        payload.insert(
            "Addr".to_string(),
            Value::String(self.ctx.config.host.addr.clone()),
        );
        payload.insert("Score".to_string(), Value::from(score));

        serde_json::to_string(&Value::Object(payload))
            .map_err(|e| NodeError::Startup(format!("encoding registration payload: {}", e)))
    }

    /// Spawn the controller and heartbeat schedules.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let controller = OrderLifecycleController::new(self.ctx.clone());
        let heartbeat = HeartbeatScheduler::new(self.ctx.clone());

        vec![
            tokio::spawn(controller.run(cancel.child_token())),
            tokio::spawn(heartbeat.run(cancel.child_token())),
        ]
    }

    /// Register, run both schedules until `shutdown` resolves, then stop
    /// them and close the session store. The store is closed on a failed
    /// registration too.
    pub async fn run_until<F>(self, shutdown: F) -> NodeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.log_carried_session().await;

        if let Err(e) = self.register().await {
            error!(error = %e, "Registration failed, aborting startup");
            if let Err(close_err) = self.ctx.session.close().await {
                error!(error = %close_err, "Failed to close session store");
            }
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let handles = self.spawn(&cancel);
        info!("hashnet node running");

        shutdown.await;
        info!("hashnet node shutting down");
        cancel.cancel();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Schedule task ended abnormally");
            }
        }

        self.ctx.session.close().await?;
        Ok(())
    }

    /// A session left by a previous run is only informational; the next
    /// poll rebuilds it from the ledger.
    async fn log_carried_session(&self) {
        match self.ctx.session.load_state().await {
            Ok(state) => {
                if let Some(buyer) = &state.buyer {
                    info!(
                        buyer = %buyer,
                        order_end_time = ?state.order_end_time,
                        "Session carried over from a previous run"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to read session state"),
        }
    }

    /// Take the machine off the marketplace and clear local state.
    #[instrument(skip_all)]
    pub async fn decommission(&self) -> NodeResult<()> {
        match self.ctx.ledger.remove_machine().await {
            Ok(receipt) => {
                info!(signature = %receipt, confirmed = true, "Machine removed");
                self.ctx
                    .emit(EventSource::Node, NodeEvent::MachineRemoved { receipt });
            }
            Err(e) => error!(error = %e, "Failed to remove machine"),
        }

        for key in SessionKey::ALL {
            if let Err(e) = self.ctx.session.delete(key).await {
                error!(key = %key, error = %e, "Failed to delete session key");
            }
        }
        self.ctx.session.close().await?;

        if let Some(dir) = &self.ctx.config.assets.model_create_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => error!(path = %dir.display(), error = %e, "Failed to remove model directory"),
            }
        }
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
