//! Harness configuration.
//!
//! Defaults reproduce the ClickHouse datasource e2e stack. A TOML file can
//! override any field, and a few environment variables are consulted last:
//!
//! - `CLICKHOUSE_VERSION`: resolved inside the database image placeholder
//! - `E2E_DOCKER_BIN`: container engine binary (default: `docker`)

use crate::error::ConfigError;
use crate::step::{to_owned_args, ImageStep, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where the project directory is mounted inside build and test containers.
pub const PROJECT_MOUNT: &str = "/src";

/// Summary file written by the k6 script's `handleSummary`.
pub const SUMMARY_FILE: &str = "test_summary.json";

const FRONTEND_IMAGE: &str = "node:16.13.2";
const PLUGIN_ID: &str = "grafana-clickhouse-datasource";

/// Configuration for the k6 test container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    pub image: String,

    pub workdir: String,

    /// k6 invocation (first element is the executable).
    pub command: Vec<String>,

    /// Project sub-paths hidden from the container.
    pub excludes: Vec<String>,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,

    /// Exit codes that mean "k6 ran"; 99 is k6's "thresholds crossed".
    pub tolerated_exit_codes: Vec<i32>,

    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("GRAFANA_URL".to_string(), "http://grafana:3000".to_string());
        Self {
            image: "grafana/k6:latest".to_string(),
            workdir: PROJECT_MOUNT.to_string(),
            command: to_owned_args(&["k6", "run", "e2e/e2ek6.test.js"]),
            excludes: to_owned_args(&["node_modules/", "ci/"]),
            timeout_secs: 0,
            tolerated_exit_codes: vec![0, 99],
            env,
        }
    }
}

/// Full harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Project checkout mounted into build and test containers.
    pub project_dir: PathBuf,

    /// Summary file, relative to `project_dir`.
    pub summary_file: PathBuf,

    /// Directory produced by the frontend build, relative to `project_dir`.
    pub artifact_dir: PathBuf,

    /// Plugin id; names the mount point inside the dashboard container.
    pub plugin_id: String,

    /// Prefix for per-run network and container names.
    pub network_prefix: String,

    /// Container engine binary.
    pub docker_binary: String,

    pub cache: ImageStep,
    pub database: ServiceConfig,
    pub backend: ImageStep,
    pub frontend: ImageStep,
    pub dashboard: ServiceConfig,
    pub runner: RunnerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            summary_file: PathBuf::from(SUMMARY_FILE),
            artifact_dir: PathBuf::from("dist"),
            plugin_id: PLUGIN_ID.to_string(),
            network_prefix: "e2e".to_string(),
            docker_binary: "docker".to_string(),
            cache: ImageStep::new(FRONTEND_IMAGE, &[&["yarn", "cache", "clean"]]),
            database: ServiceConfig::new(
                "clickhouse/clickhouse-server:${CLICKHOUSE_VERSION-23.2-alpine}",
                "clickhouse",
            ),
            backend: ImageStep::new(
                "golang:1.20",
                &[
                    &["go", "install", "github.com/magefile/mage@latest"],
                    &["mage", "build:backend"],
                ],
            ),
            frontend: ImageStep::new(
                FRONTEND_IMAGE,
                &[
                    &["yarn", "install", "--frozen-lockfile", "--no-progress"],
                    &["yarn", "build"],
                ],
            ),
            dashboard: ServiceConfig::new("grafana/grafana:latest", "grafana")
                .with_env("GF_PLUGINS_ALLOW_LOADING_UNSIGNED_PLUGINS", PLUGIN_ID),
            runner: RunnerConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load a TOML file; fields it omits keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bin) = lookup("E2E_DOCKER_BIN").filter(|b| !b.is_empty()) {
            self.docker_binary = bin;
        }
    }

    /// Point the harness at a different project checkout.
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn summary_path(&self) -> PathBuf {
        self.project_dir.join(&self.summary_file)
    }

    /// Mount point of the plugin artifact inside the dashboard container.
    pub fn plugin_mount(&self) -> String {
        format!("/var/lib/grafana/plugins/{}", self.plugin_id)
    }
}

/// Resolve `${NAME-default}` placeholders against the process environment.
pub fn resolve_image(image: &str) -> String {
    expand_placeholders(image, |name| std::env::var(name).ok())
}

/// Expand `${NAME}` and `${NAME-default}` placeholders.
///
/// An unset or empty variable takes the default (or the empty string).
/// An unterminated `${` is copied through literally.
pub fn expand_placeholders(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once('-') {
            Some((name, default)) => (name, default),
            None => (body, ""),
        };
        match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(default),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_placeholder_uses_default_when_unset() {
        let image = "clickhouse/clickhouse-server:${CLICKHOUSE_VERSION-23.2-alpine}";
        assert_eq!(
            expand_placeholders(image, no_env),
            "clickhouse/clickhouse-server:23.2-alpine"
        );
    }

    #[test]
    fn test_placeholder_uses_env_value() {
        let image = "clickhouse/clickhouse-server:${CLICKHOUSE_VERSION-23.2-alpine}";
        let resolved = expand_placeholders(image, |name| {
            (name == "CLICKHOUSE_VERSION").then(|| "24.1".to_string())
        });
        assert_eq!(resolved, "clickhouse/clickhouse-server:24.1");
    }

    #[test]
    fn test_placeholder_empty_value_falls_back() {
        let resolved = expand_placeholders("x:${V-1}", |_| Some(String::new()));
        assert_eq!(resolved, "x:1");
    }

    #[test]
    fn test_placeholder_without_default_and_unterminated() {
        assert_eq!(expand_placeholders("a${B}c", no_env), "ac");
        assert_eq!(expand_placeholders("a${B", no_env), "a${B");
        assert_eq!(expand_placeholders("plain", no_env), "plain");
    }

    #[test]
    fn test_default_paths() {
        let config = HarnessConfig::default().with_project_dir("/work");
        assert_eq!(config.summary_path(), PathBuf::from("/work/test_summary.json"));
        assert_eq!(
            config.plugin_mount(),
            "/var/lib/grafana/plugins/grafana-clickhouse-datasource"
        );
    }

    #[test]
    fn test_default_runner() {
        let runner = RunnerConfig::default();
        assert_eq!(runner.command, ["k6", "run", "e2e/e2ek6.test.js"]);
        assert_eq!(runner.excludes, ["node_modules/", "ci/"]);
        assert!(runner.tolerated_exit_codes.contains(&99));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
plugin_id = "my-plugin"

[backend]
image = "golang:1.21"
commands = [["mage", "build:backend"]]
"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.plugin_id, "my-plugin");
        assert_eq!(config.backend.image, "golang:1.21");
        assert_eq!(config.backend.commands.len(), 1);
        assert_eq!(config.backend.workdir, PROJECT_MOUNT);
        assert_eq!(config.frontend, HarnessConfig::default().frontend);
        assert_eq!(config.summary_file, PathBuf::from(SUMMARY_FILE));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "plugin_id = [").unwrap();
        let err = HarnessConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = HarnessConfig::from_file(Path::new("/nonexistent/e2e.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_docker_binary_env_override() {
        let mut config = HarnessConfig::default();
        config.apply_env_overrides(|name| {
            (name == "E2E_DOCKER_BIN").then(|| "podman".to_string())
        });
        assert_eq!(config.docker_binary, "podman");

        let mut config = HarnessConfig::default();
        config.apply_env_overrides(no_env);
        assert_eq!(config.docker_binary, "docker");
    }
}
