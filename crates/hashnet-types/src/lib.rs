//! hashnet Types - Ledger record model for rental hosts
//!
//! A hashnet host registers a machine on the marketplace ledger, receives
//! rental orders, runs the requested workload and reports the outcome back
//! so payment is released. This crate holds the data both schedules of the
//! host daemon agree on.
//!
//! ## Architectural Boundaries
//!
//! - **Ledger** owns: MachineRecord and OrderRecord state and the legality of
//!   every transition
//! - **hashnet-node** owns: polling, workload supervision, reporting
//! - **This crate** owns: the decoded shape of those records, nothing more
//!
//! ## Key Concepts
//!
//! - **MachineRecord**: this host's registration and rental status
//! - **OrderRecord**: one buyer's rental, including duration and metadata
//! - **OrderMetadata**: buyer intent and asset references inside an order
//! - **SettlementPeriod**: day bucket attached to liveness submissions
//! - **NodeEvent**: observable stream of controller and heartbeat activity

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod events;
pub mod ids;
pub mod manifest;
pub mod metadata;
pub mod period;
pub mod records;
pub mod session;
pub mod status;

pub use error::{TypesError, TypesResult};
pub use events::{EventSeverity, EventSource, NodeEvent, NodeEventEnvelope, Termination};
pub use ids::{AccountRef, MachineUuid, OrderRef, TaskId};
pub use manifest::{DownloadItem, ManifestItem, MANIFEST_FILE_NAME};
pub use metadata::{Intent, OrderInfo, OrderMetadata, TaskMetadata};
pub use period::SettlementPeriod;
pub use records::{MachineRecord, OrderRecord, Receipt};
pub use session::{SessionKey, SessionState, SessionToken};
pub use status::{MachineStatus, OrderStatus};
