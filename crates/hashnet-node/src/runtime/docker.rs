//! Workload runtime driving the docker CLI

use super::{WorkloadHandle, WorkloadMode, WorkloadRuntime};
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use hashnet_types::{DownloadItem, SessionToken};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

const WORKSPACE_CONTAINER_PORT: u16 = 8888;
const DEPLOY_CONTAINER_PORT: u16 = 7860;

/// Runs workloads as containers through `docker`
#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    config: RuntimeConfig,
    workspace_dir: PathBuf,
}

impl DockerCliRuntime {
    /// `workspace_dir` is mounted into the training workspace.
    pub fn new(config: RuntimeConfig, workspace_dir: PathBuf) -> Self {
        Self {
            config,
            workspace_dir,
        }
    }

    fn gpu_args(gpu_present: bool) -> Vec<String> {
        if gpu_present {
            vec!["--gpus".to_string(), "all".to_string()]
        } else {
            Vec::new()
        }
    }

    fn score_args(&self, gpu_present: bool) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        args.extend(Self::gpu_args(gpu_present));
        args.push(self.config.score_image.clone());
        args
    }

    fn workspace_args(&self, gpu_present: bool, token: &SessionToken) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];
        args.extend(Self::gpu_args(gpu_present));
        args.extend([
            "-p".to_string(),
            format!("{}:{}", self.config.workspace_port, WORKSPACE_CONTAINER_PORT),
            "-e".to_string(),
            format!("TOKEN={}", token.as_str()),
            "-v".to_string(),
            format!("{}:/workspace", self.workspace_dir.display()),
            self.config.workspace_image.clone(),
        ]);
        args
    }

    fn deploy_args(&self, gpu_present: bool, refs: &[DownloadItem]) -> RuntimeResult<Vec<String>> {
        let urls = serde_json::to_string(refs)?;
        let mut args = vec!["run".to_string(), "-d".to_string()];
        args.extend(Self::gpu_args(gpu_present));
        args.extend([
            "-p".to_string(),
            format!("{}:{}", self.config.deploy_port, DEPLOY_CONTAINER_PORT),
            "-e".to_string(),
            format!("DOWNLOAD_URLS={}", urls),
            self.config.deploy_image.clone(),
        ]);
        Ok(args)
    }

    /// Run the CLI to completion and return trimmed stdout.
    async fn exec(&self, args: &[String]) -> RuntimeResult<String> {
        let command_line = format!("{} {}", self.config.docker_binary, args.join(" "));
        debug!(command = %redact(&command_line), "Running workload command");

        let output = Command::new(&self.config.docker_binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: redact(&command_line),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Keep session tokens out of logs and errors.
fn redact(command_line: &str) -> String {
    command_line
        .split(' ')
        .map(|part| match part.strip_prefix("TOKEN=") {
            Some(_) => "TOKEN=***",
            None => part,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The benchmark prints its score on the last non-empty line.
fn parse_score(stdout: &str) -> RuntimeResult<f64> {
    let last = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| RuntimeError::ScoreOutput("empty output".to_string()))?;
    last.parse::<f64>()
        .map_err(|_| RuntimeError::ScoreOutput(last.to_string()))
}

#[async_trait]
impl WorkloadRuntime for DockerCliRuntime {
    async fn run_score(&self, gpu_present: bool) -> RuntimeResult<f64> {
        let stdout = self.exec(&self.score_args(gpu_present)).await?;
        let score = parse_score(&stdout)?;
        info!(score, gpu = gpu_present, "Benchmark finished");
        Ok(score)
    }

    async fn start_workspace(
        &self,
        gpu_present: bool,
        token: &SessionToken,
    ) -> RuntimeResult<WorkloadHandle> {
        let id = self.exec(&self.workspace_args(gpu_present, token)).await?;
        Ok(WorkloadHandle::new(id, WorkloadMode::Workspace))
    }

    async fn start_deploy(
        &self,
        gpu_present: bool,
        refs: &[DownloadItem],
    ) -> RuntimeResult<WorkloadHandle> {
        let id = self.exec(&self.deploy_args(gpu_present, refs)?).await?;
        Ok(WorkloadHandle::new(id, WorkloadMode::Deploy))
    }

    async fn stop(&self, handle: &WorkloadHandle) -> RuntimeResult<()> {
        self.exec(&["stop".to_string(), handle.id.clone()]).await?;
        Ok(())
    }
}
