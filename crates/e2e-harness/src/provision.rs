//! Environment provisioning.
//!
//! Brings the stack up in a fixed order: cache clear, ClickHouse, backend
//! build, frontend build, Grafana. Every step reports a [`StepResult`]; the
//! first failure stops the sequence.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{resolve_image, HarnessConfig, PROJECT_MOUNT};
use crate::container::{ContainerClient, ContainerHandle, ContainerSpec, ExecOutput, Mount};
use crate::error::{ContainerError, ProvisionError};
use crate::runner::StepResult;
use crate::step::{BuiltinStep, ImageStep, ServiceConfig};

/// Host directory produced by the frontend build and mounted into Grafana.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginArtifact {
    pub dir: PathBuf,
}

/// Resources created for one run; released by [`Environment::teardown`].
#[derive(Debug)]
pub struct Environment {
    network: String,
    services: Vec<ContainerHandle>,
}

impl Environment {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            services: Vec::new(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Running service containers, in start order.
    pub fn services(&self) -> &[ContainerHandle] {
        &self.services
    }

    /// Container name for a step of this run.
    pub fn container_name(&self, step: BuiltinStep) -> String {
        format!("{}-{}", self.network, step.name())
    }

    /// Remove services (newest first) and the network.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn teardown(self, client: &dyn ContainerClient) {
        for service in self.services.iter().rev() {
            if let Err(e) = client.remove(service).await {
                warn!(container = %service.name, error = %e, "Failed to remove container");
            }
        }
        if let Err(e) = client.remove_network(&self.network).await {
            warn!(network = %self.network, error = %e, "Failed to remove network");
        }
    }
}

/// Runs the provisioning steps against a container client.
pub struct Provisioner<'a> {
    client: &'a dyn ContainerClient,
    config: &'a HarnessConfig,
    project: PathBuf,
}

impl<'a> Provisioner<'a> {
    /// `project` must be an absolute host path; it is bind-mounted as is.
    pub fn new(
        client: &'a dyn ContainerClient,
        config: &'a HarnessConfig,
        project: PathBuf,
    ) -> Self {
        Self {
            client,
            config,
            project,
        }
    }

    /// Run every provisioning step in order, stopping at the first failure.
    ///
    /// One [`StepResult`] is appended to `results` per attempted step.
    /// Services started before a failure stay registered in `env` so the
    /// caller can tear them down.
    pub async fn provision(
        &self,
        env: &mut Environment,
        results: &mut Vec<StepResult>,
    ) -> Result<PluginArtifact, ProvisionError> {
        self.clear_cache(env, results).await?;
        self.start_database(env, results).await?;
        self.build_backend(env, results).await?;
        let artifact = self.build_frontend(env, results).await?;
        self.start_dashboard(env, &artifact, results).await?;
        Ok(artifact)
    }

    async fn clear_cache(
        &self,
        env: &Environment,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ProvisionError> {
        info!("Clearing cache");
        self.image_step(env, BuiltinStep::ClearCache, &self.config.cache, false, results)
            .await?;
        info!("Cache cleared");
        Ok(())
    }

    async fn start_database(
        &self,
        env: &mut Environment,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ProvisionError> {
        info!("Starting ClickHouse");
        let spec = self.service_spec(env, BuiltinStep::StartDatabase, &self.config.database);
        self.service_step(env, BuiltinStep::StartDatabase, spec, results)
            .await?;
        info!("ClickHouse started");
        Ok(())
    }

    async fn build_backend(
        &self,
        env: &Environment,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ProvisionError> {
        info!("Building plugin backend");
        self.image_step(env, BuiltinStep::BuildBackend, &self.config.backend, true, results)
            .await
    }

    async fn build_frontend(
        &self,
        env: &Environment,
        results: &mut Vec<StepResult>,
    ) -> Result<PluginArtifact, ProvisionError> {
        info!("Building plugin frontend");
        let dir = self.project.join(&self.config.artifact_dir);
        let start = Instant::now();
        if let Err(source) = remove_stale_artifact(&dir).await {
            let err = ProvisionError::StaleArtifact { path: dir, source };
            let step = BuiltinStep::BuildFrontend.name();
            results.push(StepResult::errored(step, &err, elapsed_ms(start)));
            return Err(err);
        }

        self.image_step(env, BuiltinStep::BuildFrontend, &self.config.frontend, true, results)
            .await?;

        if !dir.is_dir() {
            let err = ProvisionError::MissingArtifact { path: dir };
            if let Some(last) = results.last_mut() {
                last.success = false;
                last.stderr = err.to_string();
            }
            return Err(err);
        }
        info!(artifact = %dir.display(), "Plugin built");
        Ok(PluginArtifact { dir })
    }

    async fn start_dashboard(
        &self,
        env: &mut Environment,
        artifact: &PluginArtifact,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ProvisionError> {
        info!("Starting Grafana");
        let spec = self
            .service_spec(env, BuiltinStep::StartDashboard, &self.config.dashboard)
            .with_mount(Mount::bind(&artifact.dir, &self.config.plugin_mount()).read_only());
        self.service_step(env, BuiltinStep::StartDashboard, spec, results)
            .await?;
        info!("Grafana started");
        Ok(())
    }

    fn service_spec(
        &self,
        env: &Environment,
        step: BuiltinStep,
        service: &ServiceConfig,
    ) -> ContainerSpec {
        let alias = Some(service.alias.as_str()).filter(|a| !a.is_empty());
        ContainerSpec::new(env.container_name(step), resolve_image(&service.image))
            .on_network(env.network(), alias)
            .with_env(&service.env)
            .with_command(service.command.clone())
    }

    async fn service_step(
        &self,
        env: &mut Environment,
        step: BuiltinStep,
        spec: ContainerSpec,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ProvisionError> {
        let start = Instant::now();
        info!(step = %step, image = %spec.image, "Starting service");

        match self.client.start(&spec).await {
            Ok(handle) => {
                env.services.push(handle);
                results.push(StepResult::ok(step.name(), elapsed_ms(start)));
                Ok(())
            }
            Err(source) => {
                results.push(StepResult::errored(step.name(), &source, elapsed_ms(start)));
                Err(step_failed(step, source))
            }
        }
    }

    /// Run an [`ImageStep`] in a keep-alive container, exec'ing each command.
    ///
    /// The container is removed whatever the outcome.
    async fn image_step(
        &self,
        env: &Environment,
        step: BuiltinStep,
        config: &ImageStep,
        mount_project: bool,
        results: &mut Vec<StepResult>,
    ) -> Result<(), ProvisionError> {
        let start = Instant::now();
        // `exec -w` needs the directory to exist; `run -w` creates it.
        let mut spec = ContainerSpec::new(env.container_name(step), resolve_image(&config.image))
            .keep_alive()
            .with_workdir(&config.workdir);
        if mount_project {
            spec = spec.with_mount(Mount::bind(&self.project, PROJECT_MOUNT));
        }

        info!(step = %step, image = %spec.image, "Starting step");
        let handle = match self.client.start(&spec).await {
            Ok(handle) => handle,
            Err(source) => {
                results.push(StepResult::errored(step.name(), &source, elapsed_ms(start)));
                return Err(step_failed(step, source));
            }
        };

        let outcome = self.exec_all(&handle, config).await;

        if let Err(e) = self.client.remove(&handle).await {
            warn!(container = %handle.name, error = %e, "Failed to remove container");
        }

        match outcome {
            Ok(last) => {
                let mut result = StepResult::from_output(step.name(), &last, true);
                result.duration_ms = elapsed_ms(start);
                results.push(result);
                Ok(())
            }
            Err(source) => {
                results.push(StepResult::errored(step.name(), &source, elapsed_ms(start)));
                Err(step_failed(step, source))
            }
        }
    }

    async fn exec_all(
        &self,
        handle: &ContainerHandle,
        config: &ImageStep,
    ) -> Result<ExecOutput, ContainerError> {
        let mut last = ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        };

        for command in &config.commands {
            let output = self
                .client
                .exec(handle, &config.workdir, command, config.timeout_secs)
                .await?;
            if !output.success() {
                return Err(ContainerError::CommandFailed {
                    command: command.join(" "),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            last = output;
        }

        Ok(last)
    }
}

/// Delete the artifact directory left by an earlier build, if any.
async fn remove_stale_artifact(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(artifact = %dir.display(), "Removed previous plugin artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn step_failed(step: BuiltinStep, source: ContainerError) -> ProvisionError {
    ProvisionError::Step {
        step: step.name().to_string(),
        source,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
