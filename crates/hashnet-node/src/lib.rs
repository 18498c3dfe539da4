//! hashnet Node - Host daemon for a compute-rental marketplace
//!
//! The node keeps one machine in the marketplace:
//! - Order controller: polls the machine record, starts the workload for an
//!   assigned order, reports the start and later the outcome
//! - Heartbeat: submits a liveness task every few hours
//! - Node lifecycle: registration on start, decommissioning on stop
//!
//! Ledger access, workload execution, asset retrieval and session storage
//! sit behind the traits in [`ledger`], [`runtime`], [`assets`] and
//! [`session`].

#![deny(unsafe_code)]

pub mod assets;
pub mod clock;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod heartbeat;
pub mod ledger;
pub mod node;
pub mod runtime;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NodeConfig;
pub use context::{Collaborators, NodeContext};
pub use controller::{LifecycleState, OrderLifecycleController, SkipReason, TickOutcome};
pub use error::{AssetError, LedgerError, NodeError, NodeResult, RuntimeError, SessionError};
pub use heartbeat::HeartbeatScheduler;
pub use node::{build_context, shutdown_signal, Node};
