//! E2E harness for the ClickHouse Grafana datasource plugin.
//!
//! Provides an orchestrator that:
//! - Provisions ClickHouse, builds the plugin, and starts Grafana in containers
//! - Runs k6 against the assembled stack
//! - Aggregates the k6 check summary and gates on failures

pub mod config;
pub mod container;
pub mod docker;
pub mod error;
pub mod fakes;
pub mod gate;
pub mod pipeline;
pub mod provision;
pub mod runner;
pub mod step;
pub mod summary;
pub mod telemetry;

// Re-export key types
pub use config::{HarnessConfig, RunnerConfig};
pub use container::{ContainerClient, ContainerHandle, ContainerSpec, ExecOutput, Mount};
pub use docker::DockerCli;
pub use error::{ConfigError, ContainerError, ProvisionError, SummaryError};
pub use gate::{ExitGate, GateVerdict, RunOutcome};
pub use pipeline::{E2ePipeline, PipelineResult};
pub use provision::{Environment, PluginArtifact, Provisioner};
pub use runner::{StepResult, TestRunner};
pub use step::{BuiltinStep, ImageStep, ServiceConfig};
pub use summary::{load_summary, remove_stale_summary, Check, FailureTally, TestSummary};
