//! Step results and k6 test execution.

use std::path::Path;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::container::{ContainerClient, ContainerHandle, ContainerSpec, ExecOutput, Mount};
use crate::error::ContainerError;
use crate::step::BuiltinStep;

/// Result of a step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Step name.
    pub step_name: String,

    /// Exit code of the last command (-1 if none ran to completion).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr, or the error text when the step errored.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the step succeeded.
    pub success: bool,
}

impl StepResult {
    /// Whether this step passed.
    pub fn passed(&self) -> bool {
        self.success
    }

    pub(crate) fn from_output(step: &str, output: &ExecOutput, success: bool) -> Self {
        Self {
            step_name: step.to_string(),
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            duration_ms: output.duration_ms,
            success,
        }
    }

    pub(crate) fn ok(step: &str, duration_ms: u64) -> Self {
        Self {
            step_name: step.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms,
            success: true,
        }
    }

    pub(crate) fn errored(step: &str, error: &dyn std::fmt::Display, duration_ms: u64) -> Self {
        Self {
            step_name: step.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: error.to_string(),
            duration_ms,
            success: false,
        }
    }
}

/// Runs k6 in a throwaway container against the provisioned stack.
pub struct TestRunner;

impl TestRunner {
    /// Execute the load-testing tool.
    ///
    /// The project is mounted at the runner workdir with the configured
    /// excludes masked. k6 writes the summary file into the mounted project
    /// as a side effect; it is not read here.
    ///
    /// Fails if the tool cannot be started or exits with a code outside
    /// `tolerated_exit_codes`. Failing checks alone never fail this step.
    ///
    /// On timeout only the engine client is killed, so the container is
    /// force-removed here; otherwise it would keep the run network busy.
    pub async fn run(
        client: &dyn ContainerClient,
        config: &RunnerConfig,
        project: &Path,
        network: &str,
        name: &str,
    ) -> Result<StepResult, ContainerError> {
        if config.command.is_empty() {
            return Err(ContainerError::EmptyCommand);
        }

        let spec = ContainerSpec::new(name, crate::config::resolve_image(&config.image))
            .on_network(network, None)
            .with_mount(Mount::bind(project, &config.workdir).excluding(&config.excludes))
            .with_workdir(&config.workdir)
            .with_env(&config.env)
            .with_command(config.command.clone());

        info!(image = %spec.image, command = ?config.command, "Starting k6 tests");
        let output = match client.run(&spec, config.timeout_secs).await {
            Err(e @ ContainerError::Timeout { .. }) => {
                warn!(container = %name, error = %e, "k6 timed out");
                let handle = ContainerHandle {
                    name: name.to_string(),
                    id: String::new(),
                };
                if let Err(rm) = client.remove(&handle).await {
                    warn!(container = %name, error = %rm, "Failed to remove container");
                }
                return Err(e);
            }
            other => other?,
        };

        if !config.tolerated_exit_codes.contains(&output.exit_code) {
            warn!(exit_code = output.exit_code, "k6 exited abnormally");
            return Err(ContainerError::CommandFailed {
                command: config.command.join(" "),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        info!(exit_code = output.exit_code, "k6 tests ran");
        Ok(StepResult::from_output(
            BuiltinStep::RunTests.name(),
            &output,
            true,
        ))
    }
}
