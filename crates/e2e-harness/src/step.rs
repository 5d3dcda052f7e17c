//! Step definitions: the fixed provisioning and test sequence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Builtin steps, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStep {
    /// yarn cache clean in a throwaway frontend-runtime container
    ClearCache,

    /// detached ClickHouse server
    StartDatabase,

    /// mage build:backend in a Go container
    BuildBackend,

    /// yarn install --frozen-lockfile && yarn build
    BuildFrontend,

    /// detached Grafana with the plugin mounted
    StartDashboard,

    /// k6 run against the assembled stack
    RunTests,
}

impl BuiltinStep {
    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStep::ClearCache => "clear_cache",
            BuiltinStep::StartDatabase => "start_database",
            BuiltinStep::BuildBackend => "build_backend",
            BuiltinStep::BuildFrontend => "build_frontend",
            BuiltinStep::StartDashboard => "start_dashboard",
            BuiltinStep::RunTests => "run_tests",
        }
    }
}

impl std::fmt::Display for BuiltinStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A container that runs a fixed list of commands and is then removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageStep {
    /// Image reference; may contain `${NAME-default}` placeholders.
    pub image: String,

    /// Working directory inside the container.
    pub workdir: String,

    /// Commands executed in order (first element of each is the executable).
    pub commands: Vec<Vec<String>>,

    /// Per-command timeout in seconds (0 = none).
    pub timeout_secs: u64,
}

impl Default for ImageStep {
    fn default() -> Self {
        Self {
            image: String::new(),
            workdir: crate::config::PROJECT_MOUNT.to_string(),
            commands: Vec::new(),
            timeout_secs: 0,
        }
    }
}

impl ImageStep {
    /// Create a step from an image and a list of commands.
    pub fn new(image: &str, commands: &[&[&str]]) -> Self {
        Self {
            image: image.to_string(),
            commands: commands.iter().map(|c| to_owned_args(c)).collect(),
            ..Self::default()
        }
    }
}

/// A long-running container that the tests talk to over the run network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Image reference; may contain `${NAME-default}` placeholders.
    pub image: String,

    /// Network alias other containers use to reach this service.
    pub alias: String,

    /// Startup command; empty means the image's default entrypoint.
    pub command: Vec<String>,

    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl ServiceConfig {
    pub fn new(image: &str, alias: &str) -> Self {
        Self {
            image: image.to_string(),
            alias: alias.to_string(),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

pub(crate) fn to_owned_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
