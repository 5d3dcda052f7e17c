//! Error taxonomy for the e2e harness.

use std::path::PathBuf;

/// Errors produced while talking to the container engine.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("refusing to execute an empty command")]
    EmptyCommand,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while reading the k6 summary file.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    /// No summary was written, so no tests can be said to have run.
    #[error("no test results: {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("cannot decode test summary: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced while bringing the environment up.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("provisioning step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: ContainerError,
    },

    #[error("frontend build produced no plugin artifact at {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("cannot clear previous plugin artifact {}: {source}", path.display())]
    StaleArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Name of the step that failed, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            ProvisionError::Step { step, .. } => Some(step),
            ProvisionError::MissingArtifact { .. } | ProvisionError::StaleArtifact { .. } => None,
        }
    }
}

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
