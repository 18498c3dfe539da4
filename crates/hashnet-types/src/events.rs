//! Event types for hashnet observability
//!
//! Events give a structured stream of what the host did with each order
//! and each liveness beat, independent of log formatting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{OrderRef, TaskId};
use crate::metadata::Intent;
use crate::period::SettlementPeriod;
use crate::records::Receipt;
use crate::status::OrderStatus;

/// Envelope wrapping all node events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// Event severity
    pub severity: EventSeverity,

    /// The actual event
    pub event: NodeEvent,
}

impl NodeEventEnvelope {
    /// Create a new event envelope stamped at `timestamp`
    pub fn new(
        event: NodeEvent,
        source: EventSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            source,
            severity: event.severity(),
            event,
        }
    }
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Order lifecycle controller
    Controller,
    /// Liveness heartbeat
    Heartbeat,
    /// Process lifecycle (registration, decommission)
    Node,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Informational event
    Info,
    /// Something degraded but the flow continued
    Warning,
    /// The flow for the current order or beat was abandoned
    Error,
    /// A ledger submission was accepted
    Confirmed,
}

/// Why the controller stopped supervising an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Completed report accepted
    Completed,
    /// Workload failed to start; Failed report submitted (or attempted)
    StartFailed { reason: String },
    /// Buyer was refunded; workload stopped locally
    Refunded,
    /// Order metadata could not be decoded
    MalformedMetadata { reason: String },
    /// Intent is neither train nor deploy
    UnsupportedIntent { intent: String },
    /// Session token could not be persisted
    SessionUnavailable { reason: String },
    /// Start report was rejected; workload stopped
    StartRejected { reason: String },
    /// Ledger shows a status the host did not expect while running
    Anomaly { status: OrderStatus },
    /// Ledger shows a status outside the known set
    UnrecognizedStatus { value: String },
    /// Order duration puts its end time out of range; workload left running
    InvalidDuration { hours: u32 },
    /// Order could not be re-read while running
    SupervisionLost { reason: String },
    /// Duration elapsed but stop, score or report failed
    CompletionAborted { reason: String },
}

/// Node events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeEvent {
    /// Registration submission accepted
    MachineRegistered { receipt: Receipt },

    /// Remove-machine submission accepted
    MachineRemoved { receipt: Receipt },

    /// Ledger could not be read or written; retried next tick
    LedgerUnavailable { reason: String },

    /// Machine is Renting but carries the null order reference
    OrderReferenceMissing,

    /// Asset retrieval failed; execution continues
    AssetFetchFailed { order: OrderRef, reason: String },

    /// Workload is up
    WorkloadStarted { order: OrderRef, intent: Intent },

    /// Start report accepted
    OrderStartConfirmed { order: OrderRef, receipt: Receipt },

    /// Completed report accepted
    OrderCompleted { order: OrderRef, score: u8, receipt: Receipt },

    /// Failed report accepted
    OrderFailed { order: OrderRef, reason: String, receipt: Receipt },

    /// Supervision of an order ended
    OrderTerminated { order: OrderRef, termination: Termination },

    /// Liveness submission accepted
    HeartbeatConfirmed {
        task_id: TaskId,
        period: SettlementPeriod,
        receipt: Receipt,
    },

    /// Liveness submission failed; the schedule continues
    HeartbeatFailed { task_id: TaskId, reason: String },
}

impl NodeEvent {
    /// Severity inferred from the event kind
    pub fn severity(&self) -> EventSeverity {
        match self {
            NodeEvent::MachineRegistered { .. }
            | NodeEvent::MachineRemoved { .. }
            | NodeEvent::OrderStartConfirmed { .. }
            | NodeEvent::OrderCompleted { .. }
            | NodeEvent::OrderFailed { .. }
            | NodeEvent::HeartbeatConfirmed { .. } => EventSeverity::Confirmed,

            NodeEvent::LedgerUnavailable { .. }
            | NodeEvent::OrderReferenceMissing
            | NodeEvent::HeartbeatFailed { .. } => EventSeverity::Error,

            NodeEvent::AssetFetchFailed { .. } => EventSeverity::Warning,

            NodeEvent::WorkloadStarted { .. } => EventSeverity::Info,

            NodeEvent::OrderTerminated { termination, .. } => match termination {
                Termination::Completed | Termination::Refunded => EventSeverity::Info,
                Termination::StartFailed { .. } => EventSeverity::Warning,
                _ => EventSeverity::Error,
            },
        }
    }
}
