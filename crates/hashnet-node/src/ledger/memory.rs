//! Simulated ledger program held in memory
//!
//! Enforces the same order transitions the on-chain program does, so the
//! controller can be driven end to end without a relay. Buyer-side actions
//! (placing and refunding orders) are exposed as inherent methods.

use super::{LedgerGateway, TaskSubmission};
use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use hashnet_types::{
    AccountRef, MachineRecord, MachineStatus, OrderMetadata, OrderRecord, OrderRef, OrderStatus,
    Receipt,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Gateway operations, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    FetchMachine,
    FetchOrder,
    RegisterMachine,
    RemoveMachine,
    OrderStart,
    OrderCompleted,
    OrderFailed,
    Task,
}

/// A submission attempt, recorded whether or not it was accepted
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    RegisterMachine { metadata: String },
    RemoveMachine,
    OrderStart { order: OrderRef },
    OrderCompleted {
        order: OrderRef,
        metadata: OrderMetadata,
        score: u8,
    },
    OrderFailed {
        order: OrderRef,
        buyer: AccountRef,
        metadata: OrderMetadata,
    },
    Task(TaskSubmission),
}

#[derive(Default)]
struct LedgerState {
    machine: Option<MachineRecord>,
    orders: HashMap<OrderRef, OrderRecord>,
    submissions: Vec<LedgerCall>,
    failures: VecDeque<(LedgerOp, LedgerError)>,
    signatures: u64,
}

impl LedgerState {
    fn take_failure(&mut self, op: LedgerOp) -> LedgerResult<()> {
        match self.failures.iter().position(|(target, _)| *target == op) {
            Some(index) => match self.failures.remove(index) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn receipt(&mut self) -> Receipt {
        self.signatures += 1;
        Receipt::new(format!("sim-{:08}", self.signatures))
    }

    fn order_mut(&mut self, order: &OrderRef) -> LedgerResult<&mut OrderRecord> {
        self.orders
            .get_mut(order)
            .ok_or_else(|| LedgerError::NotFound(order.to_string()))
    }

    fn release_machine(&mut self) {
        if let Some(machine) = self.machine.as_mut() {
            machine.status = MachineStatus::ForRent;
            machine.order = None;
        }
    }
}

fn conflict(body: impl Into<String>) -> LedgerError {
    LedgerError::Rejected {
        status: 409,
        body: body.into(),
    }
}

/// In-memory ledger for development and testing
pub struct InMemoryLedger {
    machine_account: AccountRef,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Create an empty ledger; the machine starts unregistered
    pub fn new(machine_account: AccountRef, clock: Arc<dyn Clock>) -> Self {
        Self {
            machine_account,
            clock,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Buyer places an order on this (registered, unrented) machine.
    pub async fn place_order(
        &self,
        order: OrderRef,
        buyer: AccountRef,
        duration_hours: u32,
        metadata: impl Into<String>,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        let machine = state
            .machine
            .as_mut()
            .ok_or_else(|| LedgerError::NotFound(self.machine_account.to_string()))?;
        if machine.status == MachineStatus::Renting {
            return Err(conflict("machine is already rented"));
        }
        machine.status = MachineStatus::Renting;
        machine.order = Some(order.clone());

        let record = OrderRecord {
            status: OrderStatus::Preparing,
            buyer,
            start_time: self.clock.now(),
            duration_hours,
            metadata: metadata.into(),
        };
        state.orders.insert(order, record);
        Ok(())
    }

    /// Buyer is refunded; the machine goes back on offer.
    pub async fn refund(&self, order: &OrderRef) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        let record = state.order_mut(order)?;
        if record.status.is_final() {
            return Err(conflict(format!("order is already {}", record.status)));
        }
        record.status = OrderStatus::Refunded;
        state.release_machine();
        Ok(())
    }

    /// Overwrite the machine record.
    pub async fn seed_machine(&self, machine: MachineRecord) {
        self.state.lock().await.machine = Some(machine);
    }

    /// Overwrite an order record.
    pub async fn seed_order(&self, order: OrderRef, record: OrderRecord) {
        self.state.lock().await.orders.insert(order, record);
    }

    /// Force an order status, bypassing transition rules.
    pub async fn force_order_status(&self, order: &OrderRef, status: OrderStatus) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        state.order_mut(order)?.status = status;
        Ok(())
    }

    /// Fail the next call of `op` with `err`.
    pub async fn inject_failure(&self, op: LedgerOp, err: LedgerError) {
        self.state.lock().await.failures.push_back((op, err));
    }

    pub async fn machine(&self) -> Option<MachineRecord> {
        self.state.lock().await.machine.clone()
    }

    pub async fn order(&self, order: &OrderRef) -> Option<OrderRecord> {
        self.state.lock().await.orders.get(order).cloned()
    }

    /// Every submission attempt so far, in order.
    pub async fn submissions(&self) -> Vec<LedgerCall> {
        self.state.lock().await.submissions.clone()
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    fn machine_account(&self) -> &AccountRef {
        &self.machine_account
    }

    async fn fetch_machine(&self) -> LedgerResult<Option<MachineRecord>> {
        let mut state = self.state.lock().await;
        state.take_failure(LedgerOp::FetchMachine)?;
        Ok(state.machine.clone())
    }

    async fn fetch_order(&self, order: &OrderRef) -> LedgerResult<OrderRecord> {
        let mut state = self.state.lock().await;
        state.take_failure(LedgerOp::FetchOrder)?;
        state
            .orders
            .get(order)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(order.to_string()))
    }

    async fn register_machine(&self, metadata: &str) -> LedgerResult<Receipt> {
        let mut state = self.state.lock().await;
        state.submissions.push(LedgerCall::RegisterMachine {
            metadata: metadata.to_string(),
        });
        state.take_failure(LedgerOp::RegisterMachine)?;

        if state.machine.as_ref().is_some_and(MachineRecord::is_registered) {
            return Err(conflict("machine already registered"));
        }
        state.machine = Some(MachineRecord {
            status: MachineStatus::Idle,
            order: None,
            metadata: metadata.to_string(),
        });
        Ok(state.receipt())
    }

    async fn remove_machine(&self) -> LedgerResult<Receipt> {
        let mut state = self.state.lock().await;
        state.submissions.push(LedgerCall::RemoveMachine);
        state.take_failure(LedgerOp::RemoveMachine)?;

        match state.machine.as_ref().map(|m| m.status) {
            None => return Err(LedgerError::NotFound(self.machine_account.to_string())),
            Some(MachineStatus::Renting) => return Err(conflict("machine is rented")),
            Some(_) => {}
        }
        state.machine = None;
        Ok(state.receipt())
    }

    async fn submit_order_start(&self, order: &OrderRef) -> LedgerResult<Receipt> {
        let mut state = self.state.lock().await;
        state.submissions.push(LedgerCall::OrderStart {
            order: order.clone(),
        });
        state.take_failure(LedgerOp::OrderStart)?;

        let assigned = state
            .machine
            .as_ref()
            .is_some_and(|m| m.status == MachineStatus::Renting && m.order.as_ref() == Some(order));
        if !assigned {
            return Err(conflict(format!("{} is not assigned to this machine", order)));
        }

        let now = self.clock.now();
        let record = state.order_mut(order)?;
        if record.status != OrderStatus::Preparing {
            return Err(conflict(format!("cannot start a {} order", record.status)));
        }
        record.status = OrderStatus::Training;
        record.start_time = now;
        Ok(state.receipt())
    }

    async fn submit_order_completed(
        &self,
        order: &OrderRef,
        metadata: &OrderMetadata,
        score: u8,
    ) -> LedgerResult<Receipt> {
        let mut state = self.state.lock().await;
        state.submissions.push(LedgerCall::OrderCompleted {
            order: order.clone(),
            metadata: metadata.clone(),
            score,
        });
        state.take_failure(LedgerOp::OrderCompleted)?;

        let encoded = metadata
            .encode()
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        let record = state.order_mut(order)?;
        if record.status != OrderStatus::Training {
            return Err(conflict(format!("cannot complete a {} order", record.status)));
        }
        record.status = OrderStatus::Completed;
        record.metadata = encoded;
        state.release_machine();
        Ok(state.receipt())
    }

    async fn submit_order_failed(
        &self,
        order: &OrderRef,
        buyer: &AccountRef,
        metadata: &OrderMetadata,
    ) -> LedgerResult<Receipt> {
        let mut state = self.state.lock().await;
        state.submissions.push(LedgerCall::OrderFailed {
            order: order.clone(),
            buyer: buyer.clone(),
            metadata: metadata.clone(),
        });
        state.take_failure(LedgerOp::OrderFailed)?;

        let encoded = metadata
            .encode()
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        let record = state.order_mut(order)?;
        if &record.buyer != buyer {
            return Err(conflict("buyer does not match order"));
        }
        if !matches!(record.status, OrderStatus::Preparing | OrderStatus::Training) {
            return Err(conflict(format!("cannot fail a {} order", record.status)));
        }
        record.status = OrderStatus::Failed;
        record.metadata = encoded;
        state.release_machine();
        Ok(state.receipt())
    }

    async fn submit_task(&self, task: &TaskSubmission) -> LedgerResult<Receipt> {
        let mut state = self.state.lock().await;
        state.submissions.push(LedgerCall::Task(task.clone()));
        state.take_failure(LedgerOp::Task)?;

        if state.machine.is_none() {
            return Err(LedgerError::NotFound(self.machine_account.to_string()));
        }
        Ok(state.receipt())
    }
}
