//! Shared fixtures for the controller and heartbeat suites
//!
//! Every fake writes into one [`Journal`] so tests can assert the relative
//! order of workload and ledger calls.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hashnet_node::clock::ManualClock;
use hashnet_node::config::NodeConfig;
use hashnet_node::context::{Collaborators, NodeContext};
use hashnet_node::error::{AssetError, AssetResult, LedgerResult, RuntimeError, RuntimeResult};
use hashnet_node::ledger::{InMemoryLedger, LedgerGateway, TaskSubmission};
use hashnet_node::runtime::{WorkloadHandle, WorkloadMode, WorkloadRuntime};
use hashnet_node::session::InMemorySessionStore;
use hashnet_node::OrderLifecycleController;
use hashnet_types::{
    AccountRef, DownloadItem, MachineRecord, MachineUuid, NodeEvent, NodeEventEnvelope,
    OrderMetadata, OrderRecord, OrderRef, Receipt, SessionToken,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const MACHINE_ACCOUNT: &str = "machine-account-1";
pub const MACHINE_UUID: &str = "000102030405060708090a0b0c0d0e0f";
pub const BUYER: &str = "buyer-wallet-1";
pub const IPFS: &str = "http://ipfs.test";

/// One observable call into a collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OrderStart,
    OrderCompleted { score: u8 },
    OrderFailed { message: String },
    Task,
    Score,
    StartWorkspace,
    StartDeploy { refs: Vec<DownloadItem> },
    Stop { id: String },
    Fetch { dir: PathBuf, names: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(|c| pred(c))
    }

    pub fn submissions(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                Call::OrderStart | Call::OrderCompleted { .. } | Call::OrderFailed { .. } | Call::Task
            )
        })
    }

    pub fn workload_actions(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                Call::StartWorkspace | Call::StartDeploy { .. } | Call::Stop { .. } | Call::Score
            )
        })
    }
}

/// The simulated ledger with every submission journaled
pub struct JournaledLedger {
    inner: Arc<InMemoryLedger>,
    journal: Journal,
}

#[async_trait]
impl LedgerGateway for JournaledLedger {
    fn machine_account(&self) -> &AccountRef {
        self.inner.machine_account()
    }

    async fn fetch_machine(&self) -> LedgerResult<Option<MachineRecord>> {
        self.inner.fetch_machine().await
    }

    async fn fetch_order(&self, order: &OrderRef) -> LedgerResult<OrderRecord> {
        self.inner.fetch_order(order).await
    }

    async fn register_machine(&self, metadata: &str) -> LedgerResult<Receipt> {
        self.inner.register_machine(metadata).await
    }

    async fn remove_machine(&self) -> LedgerResult<Receipt> {
        self.inner.remove_machine().await
    }

    async fn submit_order_start(&self, order: &OrderRef) -> LedgerResult<Receipt> {
        self.journal.push(Call::OrderStart);
        self.inner.submit_order_start(order).await
    }

    async fn submit_order_completed(
        &self,
        order: &OrderRef,
        metadata: &OrderMetadata,
        score: u8,
    ) -> LedgerResult<Receipt> {
        self.journal.push(Call::OrderCompleted { score });
        self.inner.submit_order_completed(order, metadata, score).await
    }

    async fn submit_order_failed(
        &self,
        order: &OrderRef,
        buyer: &AccountRef,
        metadata: &OrderMetadata,
    ) -> LedgerResult<Receipt> {
        self.journal.push(Call::OrderFailed {
            message: metadata.order_info.message.clone(),
        });
        self.inner.submit_order_failed(order, buyer, metadata).await
    }

    async fn submit_task(&self, task: &TaskSubmission) -> LedgerResult<Receipt> {
        self.journal.push(Call::Task);
        self.inner.submit_task(task).await
    }
}

/// Workload runtime that only records what it was asked to do
pub struct FakeRuntime {
    journal: Journal,
    score: Mutex<f64>,
    fail_start: Mutex<Option<String>>,
    fail_score: Mutex<bool>,
    started: Mutex<u32>,
}

impl FakeRuntime {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            score: Mutex::new(91.7),
            fail_start: Mutex::new(None),
            fail_score: Mutex::new(false),
            started: Mutex::new(0),
        }
    }

    pub fn fail_start_with(&self, stderr: &str) {
        *self.fail_start.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn fail_score(&self) {
        *self.fail_score.lock().unwrap() = true;
    }

    pub fn set_score(&self, score: f64) {
        *self.score.lock().unwrap() = score;
    }

    fn start(&self, mode: WorkloadMode) -> RuntimeResult<WorkloadHandle> {
        if let Some(stderr) = self.fail_start.lock().unwrap().clone() {
            return Err(RuntimeError::CommandFailed {
                command: "docker run".to_string(),
                status: "exit status: 125".to_string(),
                stderr,
            });
        }
        let mut started = self.started.lock().unwrap();
        *started += 1;
        Ok(WorkloadHandle::new(format!("ctr-{}", started), mode))
    }
}

#[async_trait]
impl WorkloadRuntime for FakeRuntime {
    async fn run_score(&self, _gpu_present: bool) -> RuntimeResult<f64> {
        self.journal.push(Call::Score);
        if *self.fail_score.lock().unwrap() {
            return Err(RuntimeError::ScoreOutput("benchmark crashed".to_string()));
        }
        Ok(*self.score.lock().unwrap())
    }

    async fn start_workspace(
        &self,
        _gpu_present: bool,
        _token: &SessionToken,
    ) -> RuntimeResult<WorkloadHandle> {
        self.journal.push(Call::StartWorkspace);
        self.start(WorkloadMode::Workspace)
    }

    async fn start_deploy(
        &self,
        _gpu_present: bool,
        refs: &[DownloadItem],
    ) -> RuntimeResult<WorkloadHandle> {
        self.journal.push(Call::StartDeploy {
            refs: refs.to_vec(),
        });
        self.start(WorkloadMode::Deploy)
    }

    async fn stop(&self, handle: &WorkloadHandle) -> RuntimeResult<()> {
        self.journal.push(Call::Stop {
            id: handle.id.clone(),
        });
        Ok(())
    }
}

/// Content store backed by a URL → body map; unknown URLs are 404
pub struct FakeAssets {
    journal: Journal,
    files: Mutex<HashMap<String, String>>,
}

impl FakeAssets {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<String>) {
        self.files.lock().unwrap().insert(url.into(), body.into());
    }
}

#[async_trait]
impl hashnet_node::assets::AssetFetcher for FakeAssets {
    async fn fetch(&self, dest_dir: &Path, items: &[DownloadItem]) -> AssetResult<()> {
        self.journal.push(Call::Fetch {
            dir: dest_dir.to_path_buf(),
            names: items.iter().map(|i| i.name.clone()).collect(),
        });
        tokio::fs::create_dir_all(dest_dir).await?;
        for item in items {
            let body = self.files.lock().unwrap().get(&item.url).cloned();
            match body {
                Some(body) => tokio::fs::write(dest_dir.join(&item.name), body).await?,
                None => {
                    return Err(AssetError::Status {
                        url: item.url.clone(),
                        status: 404,
                    })
                }
            }
        }
        Ok(())
    }
}

/// A fully wired node context over fakes and the simulated ledger
pub struct Harness {
    pub ctx: NodeContext,
    pub ledger: Arc<InMemoryLedger>,
    pub runtime: Arc<FakeRuntime>,
    pub assets: Arc<FakeAssets>,
    pub session: Arc<InMemorySessionStore>,
    pub clock: Arc<ManualClock>,
    pub journal: Journal,
    pub work_dir: tempfile::TempDir,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(NodeConfig::default())
    }

    pub fn with_config(mut config: NodeConfig) -> Self {
        let work_dir = tempfile::tempdir().unwrap();
        config.assets.work_directory = work_dir.path().to_path_buf();
        config.assets.ipfs_node_url = IPFS.to_string();
        config.host.machine_uuid = MACHINE_UUID.to_string();

        let journal = Journal::default();
        let clock = Arc::new(ManualClock::new(t0()));
        let ledger = Arc::new(InMemoryLedger::new(
            AccountRef::new(MACHINE_ACCOUNT),
            clock.clone(),
        ));
        let runtime = Arc::new(FakeRuntime::new(journal.clone()));
        let assets = Arc::new(FakeAssets::new(journal.clone()));
        let session = Arc::new(InMemorySessionStore::new());

        let machine_uuid: MachineUuid = MACHINE_UUID.parse().unwrap();
        let ctx = NodeContext::new(
            config,
            machine_uuid,
            Collaborators {
                ledger: Arc::new(JournaledLedger {
                    inner: ledger.clone(),
                    journal: journal.clone(),
                }),
                runtime: runtime.clone(),
                assets: assets.clone(),
                session: session.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            ctx,
            ledger,
            runtime,
            assets,
            session,
            clock,
            journal,
            work_dir,
        }
    }

    pub fn controller(&self) -> OrderLifecycleController {
        OrderLifecycleController::new(self.ctx.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEventEnvelope> {
        self.ctx.subscribe()
    }

    /// Put the machine on the ledger, bypassing the startup benchmark.
    pub async fn register(&self) {
        if self.ledger.machine().await.is_none() {
            self.ledger.register_machine("{\"gpu\":0}").await.unwrap();
        }
    }

    /// Register the machine and have the buyer place `order`.
    pub async fn place_order(&self, order: &OrderRef, hours: u32, metadata: &str) {
        self.register().await;
        self.ledger
            .place_order(order.clone(), AccountRef::new(BUYER), hours, metadata)
            .await
            .unwrap();
    }
}

pub fn metadata(intent: &str, refs: &[&str]) -> String {
    serde_json::json!({
        "OrderInfo": {
            "Intent": intent,
            "DownloadURL": refs,
            "Message": ""
        },
        "MachineAccounts": ""
    })
    .to_string()
}

pub fn drain(rx: &mut broadcast::Receiver<NodeEventEnvelope>) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    events
}
