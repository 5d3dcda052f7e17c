//! E2E harness CLI
//!
//! The `e2e` command provisions the plugin test stack and runs k6 against it.
//!
//! ## Commands
//!
//! - `test`: provision, run k6, and report; fails if any check failed
//! - `gate`: re-check the last `test_summary.json`; fails if any check failed

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use e2e_harness::gate::FAILING_TESTS;
use e2e_harness::{
    DockerCli, E2ePipeline, ExitGate, GateVerdict, HarnessConfig, PipelineResult, RunOutcome,
};

#[derive(Parser)]
#[command(name = "e2e")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "End-to-end tests for the ClickHouse Grafana datasource", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML file overriding the built-in stack definition
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project directory (default: current directory)
    #[arg(short = 'C', long, global = true)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run k6 tests against a freshly provisioned stack
    Test,

    /// Check whether the last k6 run has failing tests
    #[command(alias = "error-handling")]
    Gate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    e2e_harness::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.workdir)?;

    match cli.command {
        Commands::Test => cmd_test(&config).await,
        Commands::Gate => cmd_gate(&config),
    }
}

fn load_config(path: Option<&Path>, workdir: Option<PathBuf>) -> Result<HarnessConfig> {
    let config = HarnessConfig::load(path).context("Failed to load harness configuration")?;
    Ok(match workdir {
        Some(dir) => config.with_project_dir(dir),
        None => config,
    })
}

/// Provision, run k6, aggregate, and gate on the outcome
async fn cmd_test(config: &HarnessConfig) -> Result<()> {
    info!(
        docker = %config.docker_binary,
        project = %config.project_dir.display(),
        "Test starting"
    );

    let client = Arc::new(DockerCli::new(&config.docker_binary));
    let result = E2ePipeline::run(client, config)
        .await
        .context("E2E pipeline failed to run")?;

    print_run(&result);

    let verdict = ExitGate::evaluate(&result.outcome);
    print_verdict(&verdict);
    finish(&verdict)
}

/// Evaluate the persisted summary of the last run
fn cmd_gate(config: &HarnessConfig) -> Result<()> {
    let path = config.summary_path();
    println!("Checking {}", path.display());

    let (outcome, verdict) = ExitGate::evaluate_file(&path);
    if let RunOutcome::Passed { checks } = outcome {
        println!("{checks} check(s) recorded");
    }
    print_verdict(&verdict);
    finish(&verdict)
}

fn print_run(result: &PipelineResult) {
    println!("Run ID: {}", result.run_id);
    println!(
        "Status: {}",
        if result.success() { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for step in &result.steps {
        let status = if step.passed() { "✓" } else { "✗" };
        println!(
            "  {} {} ({}ms, exit code: {})",
            status, step.step_name, step.duration_ms, step.exit_code
        );
        if !step.passed() && !step.stderr.is_empty() {
            println!("      {}", step.stderr.trim());
        }
    }

    if result.tally.total() > 0 {
        println!();
        for name in result.tally.passed() {
            println!("  ✓ {name}");
        }
        for name in result.tally.failed() {
            println!("  ✗ {name}");
        }
    }

    println!();
    println!(
        "Summary: {}/{} steps passed, {} failing check(s)",
        result.passed_count(),
        result.steps.len(),
        result.tally.failures()
    );
}

fn print_verdict(verdict: &GateVerdict) {
    println!("Gate: {}", if verdict.passed { "✓ PASSED" } else { "✗ FAILED" });
    if !verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
    }
}

fn finish(verdict: &GateVerdict) -> Result<()> {
    if verdict.passed {
        println!("\n✓ {}", verdict.message);
        Ok(())
    } else {
        anyhow::bail!(FAILING_TESTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> HarnessConfig {
        HarnessConfig::default().with_project_dir(dir)
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["e2e", "test"]).unwrap();
        assert!(matches!(cli.command, Commands::Test));

        let cli = Cli::try_parse_from(["e2e", "error-handling", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Gate));
        assert!(cli.json);

        let cli = Cli::try_parse_from(["e2e", "-C", "/work", "gate"]).unwrap();
        assert_eq!(cli.workdir, Some(PathBuf::from("/work")));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["e2e", "deploy"]).is_err());
    }

    #[test]
    fn test_workdir_overrides_project_dir() {
        let config = load_config(None, Some(PathBuf::from("/work"))).unwrap();
        assert_eq!(config.summary_path(), PathBuf::from("/work/test_summary.json"));
    }

    #[test]
    fn test_gate_fails_on_failing_check() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test_summary.json"),
            r#"{"root_group":{"checks":[{"name":"a","passes":1,"fails":0},{"name":"b","passes":0,"fails":1}]}}"#,
        )
        .unwrap();

        let err = cmd_gate(&config_in(dir.path())).unwrap_err();
        assert_eq!(err.to_string(), "Failing tests");
    }

    #[test]
    fn test_gate_passes_on_clean_summary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test_summary.json"),
            r#"{"root_group":{"checks":[{"name":"a","passes":1,"fails":0}]}}"#,
        )
        .unwrap();

        assert!(cmd_gate(&config_in(dir.path())).is_ok());
    }

    #[test]
    fn test_gate_fails_without_summary() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_gate(&config_in(dir.path())).is_err());
    }

    #[tokio::test]
    async fn test_missing_docker_binary_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.docker_binary = "/nonexistent/docker".to_string();

        let err = cmd_test(&config).await.unwrap_err();
        assert!(err.to_string().contains("E2E pipeline failed to run"));
    }
}
