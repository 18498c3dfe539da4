//! Ledger gateway
//!
//! Reads machine and order records and submits host transactions. Every
//! submission resolves to a [`Receipt`] once the ledger accepted it, or an
//! error once it was rejected; there is no pending state on this side.

mod memory;
mod relay;

pub use memory::{InMemoryLedger, LedgerCall, LedgerOp};
pub use relay::RelayLedgerGateway;

use crate::error::LedgerResult;
use async_trait::async_trait;
use hashnet_types::{
    AccountRef, MachineRecord, MachineUuid, OrderMetadata, OrderRecord, OrderRef, Receipt,
    SettlementPeriod, TaskId, TaskMetadata,
};
use serde::{Deserialize, Serialize};

/// A liveness submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: TaskId,
    pub machine_uuid: MachineUuid,
    pub period: SettlementPeriod,
    pub metadata: TaskMetadata,
}

/// Access to the marketplace ledger for one host machine
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// This host's machine account
    fn machine_account(&self) -> &AccountRef;

    /// Read the machine record; `None` when the machine is not registered
    async fn fetch_machine(&self) -> LedgerResult<Option<MachineRecord>>;

    /// Read an order record
    async fn fetch_order(&self, order: &OrderRef) -> LedgerResult<OrderRecord>;

    /// Register the machine with an opaque registration payload
    async fn register_machine(&self, metadata: &str) -> LedgerResult<Receipt>;

    /// Remove the machine from the marketplace
    async fn remove_machine(&self) -> LedgerResult<Receipt>;

    /// Report that the workload for `order` is running
    async fn submit_order_start(&self, order: &OrderRef) -> LedgerResult<Receipt>;

    /// Report successful completion together with the benchmark score
    async fn submit_order_completed(
        &self,
        order: &OrderRef,
        metadata: &OrderMetadata,
        score: u8,
    ) -> LedgerResult<Receipt>;

    /// Report failure; the buyer account receives the refund
    async fn submit_order_failed(
        &self,
        order: &OrderRef,
        buyer: &AccountRef,
        metadata: &OrderMetadata,
    ) -> LedgerResult<Receipt>;

    /// Submit a liveness task
    async fn submit_task(&self, task: &TaskSubmission) -> LedgerResult<Receipt>;
}
