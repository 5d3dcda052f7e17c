//! End-to-end pipeline orchestration.

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::container::ContainerClient;
use crate::gate::RunOutcome;
use crate::provision::{Environment, Provisioner};
use crate::runner::{StepResult, TestRunner};
use crate::step::BuiltinStep;
use crate::summary::{load_summary, remove_stale_summary, FailureTally};

/// Result of a complete pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Unique id of this run; also names its network and containers.
    pub run_id: String,

    pub started_at: DateTime<Utc>,

    /// Results of the steps that were attempted, in order.
    pub steps: Vec<StepResult>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Check outcomes decoded from the summary file.
    pub tally: FailureTally,

    pub outcome: RunOutcome,
}

impl PipelineResult {
    /// Number of steps that passed.
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    /// Number of steps that failed.
    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed()).count()
    }

    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// E2E pipeline orchestrator.
pub struct E2ePipeline;

impl E2ePipeline {
    /// Provision the stack, run k6, and aggregate its summary.
    ///
    /// Only setup that happens before any container exists (resolving the
    /// project, clearing the stale summary, creating the run network)
    /// returns `Err`. Everything after that is reported through
    /// [`PipelineResult::outcome`], and the environment is always torn down.
    pub async fn run(
        client: Arc<dyn ContainerClient>,
        config: &HarnessConfig,
    ) -> anyhow::Result<PipelineResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        let project = tokio::fs::canonicalize(&config.project_dir)
            .await
            .with_context(|| {
                format!("Project directory {} not found", config.project_dir.display())
            })?;
        let summary_path = project.join(&config.summary_file);

        remove_stale_summary(&summary_path).with_context(|| {
            format!("Failed to remove stale summary {}", summary_path.display())
        })?;

        let network = format!("{}-{}", config.network_prefix, &run_id[..8]);
        client
            .create_network(&network)
            .await
            .with_context(|| format!("Failed to create network {network}"))?;

        info!(run_id = %run_id, network = %network, "Starting e2e pipeline");

        let mut env = Environment::new(network);
        let mut steps = Vec::new();
        let mut tally = FailureTally::new();

        let outcome = Self::execute(
            client.as_ref(),
            config,
            &project,
            &summary_path,
            &mut env,
            &mut steps,
            &mut tally,
        )
        .await;

        env.teardown(client.as_ref()).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        if outcome.is_success() {
            info!(run_id = %run_id, duration_ms, "E2E pipeline passed");
        } else {
            info!(run_id = %run_id, duration_ms, "E2E pipeline failed");
        }

        Ok(PipelineResult {
            run_id,
            started_at,
            steps,
            duration_ms,
            tally,
            outcome,
        })
    }

    async fn execute(
        client: &dyn ContainerClient,
        config: &HarnessConfig,
        project: &Path,
        summary_path: &Path,
        env: &mut Environment,
        steps: &mut Vec<StepResult>,
        tally: &mut FailureTally,
    ) -> RunOutcome {
        let provisioner = Provisioner::new(client, config, project.to_path_buf());
        if let Err(e) = provisioner.provision(env, steps).await {
            error!(error = %e, "Provisioning failed");
            return RunOutcome::infrastructure(e);
        }

        let name = env.container_name(BuiltinStep::RunTests);
        let start = Instant::now();
        match TestRunner::run(client, &config.runner, project, env.network(), &name).await {
            Ok(result) => steps.push(result),
            Err(e) => {
                error!(error = %e, "k6 could not run");
                let elapsed = start.elapsed().as_millis() as u64;
                steps.push(StepResult::errored(BuiltinStep::RunTests.name(), &e, elapsed));
                return RunOutcome::infrastructure(format!("k6 could not run: {e}"));
            }
        }

        info!("Checking test summary");
        match load_summary(summary_path) {
            Ok(summary) => tally.record(&summary),
            Err(e) => {
                error!(error = %e, "Cannot use test summary");
                return RunOutcome::infrastructure(e);
            }
        }
        info!(failures = tally.failures(), "Test summary check complete");

        RunOutcome::from_tally(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, success: bool) -> StepResult {
        StepResult {
            step_name: name.to_string(),
            exit_code: if success { 0 } else { 1 },
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 100,
            success,
        }
    }

    #[test]
    fn test_pipeline_result_counts() {
        let result = PipelineResult {
            run_id: "run123".to_string(),
            started_at: Utc::now(),
            steps: vec![step("clear_cache", true), step("start_database", true)],
            duration_ms: 300,
            tally: FailureTally::new(),
            outcome: RunOutcome::Passed { checks: 0 },
        };

        assert_eq!(result.passed_count(), 2);
        assert_eq!(result.failed_count(), 0);
        assert!(result.success());
    }

    #[test]
    fn test_pipeline_result_with_failures() {
        let result = PipelineResult {
            run_id: "run123".to_string(),
            started_at: Utc::now(),
            steps: vec![step("clear_cache", true), step("start_database", false)],
            duration_ms: 300,
            tally: FailureTally::new(),
            outcome: RunOutcome::infrastructure("start_database failed"),
        };

        assert_eq!(result.passed_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert!(!result.success());
    }
}
