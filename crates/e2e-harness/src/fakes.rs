//! In-memory container client (testing only)
//!
//! [`RecordingClient`] records every call, answers with scripted exit codes,
//! and runs optional hooks so tests can reproduce side effects such as the
//! frontend build writing `dist/` or k6 writing its summary file.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::container::{ContainerClient, ContainerHandle, ContainerSpec, ExecOutput};
use crate::error::ContainerError;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateNetwork(String),
    RemoveNetwork(String),
    Start {
        name: String,
        image: String,
        workdir: Option<String>,
    },
    Run {
        name: String,
        image: String,
        command: Vec<String>,
    },
    Exec {
        container: String,
        workdir: String,
        command: Vec<String>,
    },
    Remove(String),
}

type CommandHook = Box<dyn Fn(&[String]) + Send + Sync>;

/// Scriptable fake engine.
#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    exit_codes: HashMap<String, i32>,
    failing_images: HashSet<String>,
    timeouts: HashMap<String, u64>,
    unavailable: bool,
    hooks: Vec<CommandHook>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the command whose space-joined form equals `command` exit with `code`.
    pub fn with_exit_code(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    /// Make `start` fail for containers using `image`.
    pub fn failing_start(mut self, image: &str) -> Self {
        self.failing_images.insert(image.to_string());
        self
    }

    /// Make the command whose space-joined form equals `command` time out
    /// after `secs`, as a hung workload would.
    pub fn timing_out(mut self, command: &str, secs: u64) -> Self {
        self.timeouts.insert(command.to_string(), secs);
        self
    }

    /// Every call fails as if the engine binary could not be spawned.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Run `hook` for every `run` and `exec` command before answering.
    pub fn on_command(mut self, hook: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Space-joined commands of every `run` and `exec`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Run { command, .. } | Call::Exec { command, .. } => Some(command.join(" ")),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), ContainerError> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable {
            return Err(ContainerError::Spawn {
                binary: "fake-docker".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        Ok(())
    }

    fn answer(&self, command: &[String]) -> Result<ExecOutput, ContainerError> {
        let line = command.join(" ");
        if let Some(&timeout_secs) = self.timeouts.get(&line) {
            return Err(ContainerError::Timeout {
                command: line,
                timeout_secs,
            });
        }
        for hook in &self.hooks {
            hook(command);
        }
        let exit_code = self
            .exit_codes
            .get(&line)
            .copied()
            .unwrap_or(0);
        Ok(ExecOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("{line} failed")
            },
            duration_ms: 0,
        })
    }
}

#[async_trait]
impl ContainerClient for RecordingClient {
    async fn create_network(&self, name: &str) -> Result<(), ContainerError> {
        self.record(Call::CreateNetwork(name.to_string()))
    }

    async fn remove_network(&self, name: &str) -> Result<(), ContainerError> {
        self.record(Call::RemoveNetwork(name.to_string()))
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError> {
        self.record(Call::Start {
            name: spec.name.clone(),
            image: spec.image.clone(),
            workdir: spec.workdir.clone(),
        })?;
        if self.failing_images.contains(&spec.image) {
            return Err(ContainerError::CommandFailed {
                command: format!("run -d {}", spec.image),
                exit_code: 125,
                stderr: "Unable to find image".to_string(),
            });
        }
        Ok(ContainerHandle {
            name: spec.name.clone(),
            id: format!("id-{}", spec.name),
        })
    }

    async fn run(
        &self,
        spec: &ContainerSpec,
        _timeout_secs: u64,
    ) -> Result<ExecOutput, ContainerError> {
        self.record(Call::Run {
            name: spec.name.clone(),
            image: spec.image.clone(),
            command: spec.command.clone(),
        })?;
        self.answer(&spec.command)
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        workdir: &str,
        command: &[String],
        _timeout_secs: u64,
    ) -> Result<ExecOutput, ContainerError> {
        self.record(Call::Exec {
            container: container.name.clone(),
            workdir: workdir.to_string(),
            command: command.to_vec(),
        })?;
        self.answer(command)
    }

    async fn remove(&self, container: &ContainerHandle) -> Result<(), ContainerError> {
        self.record(Call::Remove(container.name.clone()))
    }
}
