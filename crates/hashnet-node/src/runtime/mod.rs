//! Workload runtime
//!
//! Starts and stops the isolated workload that serves an order, and runs
//! the benchmark whose score accompanies registration and completion.

mod docker;

pub use docker::DockerCliRuntime;

use crate::error::RuntimeResult;
use async_trait::async_trait;
use hashnet_types::{DownloadItem, SessionToken};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of workload a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadMode {
    /// Interactive training workspace
    Workspace,
    /// Model deployment
    Deploy,
}

/// A started workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadHandle {
    /// Runtime-assigned identifier (container id)
    pub id: String,
    pub mode: WorkloadMode,
}

impl WorkloadHandle {
    pub fn new(id: impl Into<String>, mode: WorkloadMode) -> Self {
        Self {
            id: id.into(),
            mode,
        }
    }
}

impl fmt::Display for WorkloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.id.chars().take(12).collect();
        write!(f, "{:?}:{}", self.mode, short)
    }
}

/// Isolated workload execution
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// Run the benchmark to completion and return its raw score
    async fn run_score(&self, gpu_present: bool) -> RuntimeResult<f64>;

    /// Start the training workspace, reachable with `token`
    async fn start_workspace(
        &self,
        gpu_present: bool,
        token: &SessionToken,
    ) -> RuntimeResult<WorkloadHandle>;

    /// Start a deployment serving the resolved assets
    async fn start_deploy(
        &self,
        gpu_present: bool,
        refs: &[DownloadItem],
    ) -> RuntimeResult<WorkloadHandle>;

    /// Stop a workload
    async fn stop(&self, handle: &WorkloadHandle) -> RuntimeResult<()>;
}

/// Benchmark scores are reported to the ledger as a single byte. The
/// fractional part is dropped; out-of-range values saturate and NaN is 0.
pub fn score_to_u8(score: f64) -> u8 {
    score as u8
}
