//! Observable results of a controller tick

use crate::runtime::WorkloadHandle;
use hashnet_types::{MachineStatus, OrderRef, OrderStatus, Termination};

/// Lifecycle states of order fulfillment
///
/// Only `Waiting` and `Running` persist between ticks. `FetchingAssets`
/// and `Terminal` are passed through inside a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Waiting,
    FetchingAssets,
    Running,
    Terminal,
}

/// Why a tick took no action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Ledger read failed; retried next tick
    LedgerUnavailable(String),
    /// The machine has no ledger record
    NotRegistered,
    /// Machine is Renting but holds the null order reference
    OrderReferenceMissing,
    /// Assigned order is past the point where it can be started
    OrderNotPreparing { order: OrderRef, status: OrderStatus },
    /// Ledger returned a status outside the known set
    UnrecognizedStatus(String),
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Machine is not rented
    Idle { status: MachineStatus },
    /// Nothing could be done this tick
    Skipped(SkipReason),
    /// Workload started and the start report was accepted
    Started {
        order: OrderRef,
        handle: WorkloadHandle,
    },
    /// Order is running and its duration has not elapsed
    Supervising {
        order: OrderRef,
        remaining: chrono::Duration,
    },
    /// Supervision ended; the controller is back in `Waiting`
    Terminated {
        order: OrderRef,
        termination: Termination,
    },
}

impl TickOutcome {
    /// Termination reason, when the tick ended an order.
    pub fn termination(&self) -> Option<&Termination> {
        match self {
            TickOutcome::Terminated { termination, .. } => Some(termination),
            _ => None,
        }
    }
}
