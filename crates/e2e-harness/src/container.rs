//! Container engine abstraction.
//!
//! The harness only needs a handful of engine operations: start a container,
//! run one to completion, exec into a running one, remove it, and manage a
//! per-run network. [`ContainerClient`] captures exactly that, so the
//! pipeline runs unchanged against [`crate::docker::DockerCli`] in production
//! and [`crate::fakes::RecordingClient`] in tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ContainerError;

/// A host directory bind-mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,

    /// Sub-paths (relative to `container`) hidden behind anonymous volumes.
    pub excludes: Vec<String>,
}

impl Mount {
    pub fn bind(host: impl Into<PathBuf>, container: &str) -> Self {
        Self {
            host: host.into(),
            container: container.to_string(),
            read_only: false,
            excludes: Vec::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn excluding(mut self, paths: &[String]) -> Self {
        self.excludes.extend(paths.iter().cloned());
        self
    }

    /// Absolute container paths that must be masked.
    pub fn masked_paths(&self) -> Vec<String> {
        let root = self.container.trim_end_matches('/');
        self.excludes
            .iter()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|p| format!("{root}/{p}"))
            .collect()
    }
}

/// Everything needed to start a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name; unique per run.
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    pub alias: Option<String>,
    pub mounts: Vec<Mount>,
    pub workdir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Option<String>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    /// Join `network`, reachable by the given alias.
    pub fn on_network(mut self, network: &str, alias: Option<&str>) -> Self {
        self.network = Some(network.to_string());
        self.alias = alias.map(str::to_string);
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_workdir(mut self, workdir: &str) -> Self {
        self.workdir = Some(workdir.to_string());
        self
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Keep the container idle so commands can be exec'd into it.
    pub fn keep_alive(mut self) -> Self {
        self.entrypoint = Some("sleep".to_string());
        self.command = vec!["infinity".to_string()];
        self
    }
}

/// A started container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub name: String,
    /// Engine-assigned id (may be empty for engines that do not report one).
    pub id: String,
}

/// Captured result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the harness needs from a container engine.
///
/// Non-zero exit codes of workload commands ([`ContainerClient::run`],
/// [`ContainerClient::exec`]) are returned in [`ExecOutput`]; callers decide
/// what counts as failure. Engine-level operations fail with
/// [`ContainerError::CommandFailed`] instead.
#[async_trait]
pub trait ContainerClient: Send + Sync {
    async fn create_network(&self, name: &str) -> Result<(), ContainerError>;

    async fn remove_network(&self, name: &str) -> Result<(), ContainerError>;

    /// Start a container in the background.
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError>;

    /// Run a throwaway container to completion.
    async fn run(&self, spec: &ContainerSpec, timeout_secs: u64)
        -> Result<ExecOutput, ContainerError>;

    /// Execute a command inside a running container.
    async fn exec(
        &self,
        container: &ContainerHandle,
        workdir: &str,
        command: &[String],
        timeout_secs: u64,
    ) -> Result<ExecOutput, ContainerError>;

    /// Force-remove a container.
    async fn remove(&self, container: &ContainerHandle) -> Result<(), ContainerError>;
}
