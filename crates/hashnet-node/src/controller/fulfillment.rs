//! WAITING and FETCHING_ASSETS: picking up an assigned order and starting it

use super::{ActiveOrder, LifecycleState, OrderLifecycleController, Phase, SkipReason, TickOutcome};
use crate::assets::read_manifest;
use crate::error::{LedgerError, RuntimeError, SessionError};
use hashnet_types::{
    AccountRef, DownloadItem, EventSource, Intent, MachineStatus, NodeEvent, OrderMetadata,
    OrderRecord, OrderRef, OrderStatus, SessionKey, SessionToken, Termination, MANIFEST_FILE_NAME,
};
use tracing::{debug, error, info, warn};

impl OrderLifecycleController {
    /// WAITING: read the machine record and pick up a freshly assigned order.
    pub(super) async fn poll_machine(&mut self) -> TickOutcome {
        let machine = match self.ctx.ledger.fetch_machine().await {
            Ok(Some(machine)) => machine,
            Ok(None) => {
                warn!("Machine is not registered on the ledger");
                return TickOutcome::Skipped(SkipReason::NotRegistered);
            }
            Err(e) => return self.ledger_read_failed("machine", e),
        };

        match machine.status {
            MachineStatus::Idle | MachineStatus::ForRent => {
                debug!(status = %machine.status, "Machine not rented");
                return TickOutcome::Idle {
                    status: machine.status,
                };
            }
            MachineStatus::Renting => {}
        }

        let Some(order) = machine.order else {
            error!("Machine is Renting but carries no order reference");
            self.ctx
                .emit(EventSource::Controller, NodeEvent::OrderReferenceMissing);
            return TickOutcome::Skipped(SkipReason::OrderReferenceMissing);
        };

        let record = match self.ctx.ledger.fetch_order(&order).await {
            Ok(record) => record,
            Err(e) => return self.ledger_read_failed("order", e),
        };

        if record.status != OrderStatus::Preparing {
            info!(
                order = %order,
                status = %record.status,
                "Assigned order is not waiting to start"
            );
            return TickOutcome::Skipped(SkipReason::OrderNotPreparing {
                order,
                status: record.status,
            });
        }

        info!(order = %order, buyer = %record.buyer, "Machine is Renting, fulfilling order");
        self.fulfill(order, record).await
    }

    fn ledger_read_failed(&self, record: &'static str, err: LedgerError) -> TickOutcome {
        if let LedgerError::UnrecognizedStatus { value, .. } = err {
            error!(record, status = %value, "Ledger returned an unrecognized status");
            return TickOutcome::Skipped(SkipReason::UnrecognizedStatus(value));
        }
        error!(record, error = %err, "Failed to read ledger record");
        let reason = err.to_string();
        self.ctx.emit(
            EventSource::Controller,
            NodeEvent::LedgerUnavailable {
                reason: reason.clone(),
            },
        );
        TickOutcome::Skipped(SkipReason::LedgerUnavailable(reason))
    }

    /// FETCHING_ASSETS through the start report, all inside one tick.
    async fn fulfill(&mut self, order: OrderRef, record: OrderRecord) -> TickOutcome {
        debug!(order = %order, state = ?LifecycleState::FetchingAssets, "Preparing workload");

        let metadata = match record.decode_metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                return self.terminate(
                    order,
                    Termination::MalformedMetadata {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let gpu = self.ctx.gpu_present();
        let started = match metadata.intent() {
            Intent::Train => {
                let token = match self.issue_token(&record.buyer).await {
                    Ok(token) => token,
                    Err(e) => return self.session_unavailable(order, e),
                };
                self.fetch_workspace_assets(&order, &metadata).await;
                self.ctx.runtime.start_workspace(gpu, &token).await
            }
            Intent::Deploy => {
                if let Err(e) = self.issue_token(&record.buyer).await {
                    return self.session_unavailable(order, e);
                }
                let refs = self.resolve_deploy_assets(&order, &metadata).await;
                self.ctx.runtime.start_deploy(gpu, &refs).await
            }
            Intent::Other(intent) => {
                let intent = intent.clone();
                return self.terminate(order, Termination::UnsupportedIntent { intent });
            }
        };

        let handle = match started {
            Ok(handle) => handle,
            Err(e) => return self.report_start_failure(order, &record.buyer, metadata, e).await,
        };

        let intent = metadata.intent().clone();
        info!(order = %order, workload = %handle, intent = %intent, "Workload started");
        self.ctx.emit(
            EventSource::Controller,
            NodeEvent::WorkloadStarted {
                order: order.clone(),
                intent: intent.clone(),
            },
        );

        match self.ctx.ledger.submit_order_start(&order).await {
            Ok(receipt) => {
                info!(order = %order, signature = %receipt, confirmed = true, "Order start reported");
                self.ctx.emit(
                    EventSource::Controller,
                    NodeEvent::OrderStartConfirmed {
                        order: order.clone(),
                        receipt,
                    },
                );
                self.phase = Phase::Running(ActiveOrder {
                    order: order.clone(),
                    buyer: record.buyer,
                    intent,
                    handle: handle.clone(),
                });
                TickOutcome::Started { order, handle }
            }
            Err(e) => {
                error!(order = %order, error = %e, "Order start report failed, stopping workload");
                if let Err(stop_err) = self.ctx.runtime.stop(&handle).await {
                    error!(order = %order, workload = %handle, error = %stop_err, "Failed to stop workload");
                }
                self.terminate(
                    order,
                    Termination::StartRejected {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Fresh token for the buyer's workspace, recorded with the buyer.
    async fn issue_token(&self, buyer: &AccountRef) -> Result<SessionToken, SessionError> {
        let token = SessionToken::generate();
        self.ctx.session.put(SessionKey::Buyer, buyer.as_str()).await?;
        self.ctx.session.put(SessionKey::Token, token.as_str()).await?;
        debug!(buyer = %buyer, "Issued session token");
        Ok(token)
    }

    fn session_unavailable(&mut self, order: OrderRef, err: SessionError) -> TickOutcome {
        self.terminate(
            order,
            Termination::SessionUnavailable {
                reason: err.to_string(),
            },
        )
    }

    fn asset_fetch_failed(&self, order: &OrderRef, phase: &'static str, reason: String) {
        warn!(order = %order, phase, error = %reason, "Asset retrieval failed, continuing");
        self.ctx.emit(
            EventSource::Controller,
            NodeEvent::AssetFetchFailed {
                order: order.clone(),
                reason,
            },
        );
    }

    /// Train: each reference names a manifest; its items land in the
    /// workspace directory. Failures are logged and skipped.
    async fn fetch_workspace_assets(&self, order: &OrderRef, metadata: &OrderMetadata) {
        let dir = self.ctx.config.assets.workspace_dir();
        let urls = self.ctx.urls();

        for cid in metadata.download_refs() {
            let manifest = [DownloadItem::new(urls.ipfs(cid), MANIFEST_FILE_NAME)];
            if let Err(e) = self.ctx.assets.fetch(&dir, &manifest).await {
                self.asset_fetch_failed(order, "manifest", e.to_string());
                continue;
            }

            let entries = match read_manifest(&dir.join(MANIFEST_FILE_NAME)).await {
                Ok(entries) => entries,
                Err(e) => {
                    self.asset_fetch_failed(order, "manifest", e.to_string());
                    continue;
                }
            };

            let items: Vec<DownloadItem> = entries
                .into_iter()
                .map(|entry| DownloadItem::new(urls.ipfs(&entry.cid), entry.name))
                .collect();
            info!(order = %order, manifest = %cid, files = items.len(), "Fetching workspace assets");

            if let Err(e) = self.ctx.assets.fetch(&dir, &items).await {
                self.asset_fetch_failed(order, "items", e.to_string());
            }
        }
    }

    /// Deploy: only the first reference is used. Its manifest is read and
    /// deleted; the listed items are handed to the deployment by URL.
    async fn resolve_deploy_assets(&self, order: &OrderRef, metadata: &OrderMetadata) -> Vec<DownloadItem> {
        let Some(cid) = metadata.download_refs().first() else {
            return Vec::new();
        };

        let dir = self.ctx.config.assets.work_directory.clone();
        let urls = self.ctx.urls();
        let manifest_path = dir.join(MANIFEST_FILE_NAME);

        let manifest = [DownloadItem::new(urls.ipfs(cid), MANIFEST_FILE_NAME)];
        if let Err(e) = self.ctx.assets.fetch(&dir, &manifest).await {
            self.asset_fetch_failed(order, "manifest", e.to_string());
            return Vec::new();
        }

        let entries = read_manifest(&manifest_path).await;
        if let Err(e) = tokio::fs::remove_file(&manifest_path).await {
            warn!(path = %manifest_path.display(), error = %e, "Failed to remove manifest");
        }

        match entries {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| DownloadItem::new(urls.gateway(&entry.cid), entry.name))
                .collect(),
            Err(e) => {
                self.asset_fetch_failed(order, "manifest", e.to_string());
                Vec::new()
            }
        }
    }

    /// The workload never came up: tell the ledger so the buyer is refunded.
    async fn report_start_failure(
        &mut self,
        order: OrderRef,
        buyer: &AccountRef,
        metadata: OrderMetadata,
        err: RuntimeError,
    ) -> TickOutcome {
        let reason = err.to_string();
        error!(order = %order, error = %reason, "Workload failed to start, reporting failure");

        let metadata = metadata
            .with_machine_account(self.ctx.ledger.machine_account().as_str())
            .with_message(reason.clone());

        match self.ctx.ledger.submit_order_failed(&order, buyer, &metadata).await {
            Ok(receipt) => {
                info!(order = %order, signature = %receipt, confirmed = true, "Order failure reported");
                self.ctx.emit(
                    EventSource::Controller,
                    NodeEvent::OrderFailed {
                        order: order.clone(),
                        reason: reason.clone(),
                        receipt,
                    },
                );
            }
            Err(e) => {
                error!(order = %order, error = %e, "Order failure report was not accepted");
            }
        }

        self.terminate(order, Termination::StartFailed { reason })
    }
}
