//! [`ContainerClient`] backed by the `docker` command line.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::container::{ContainerClient, ContainerHandle, ContainerSpec, ExecOutput};
use crate::error::ContainerError;

/// Drives a Docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    /// Invoke the binary and capture its output; never interprets the exit code.
    async fn invoke(
        &self,
        args: &[String],
        timeout_secs: u64,
    ) -> Result<ExecOutput, ContainerError> {
        let start = Instant::now();
        debug!(binary = %self.binary, args = ?args, "invoking container engine");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ContainerError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let output = if timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| ContainerError::Timeout {
                    command: self.describe(args),
                    timeout_secs,
                })??
        } else {
            child.wait_with_output().await?
        };

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Invoke an engine-level operation, where a non-zero exit is an error.
    async fn invoke_checked(&self, args: &[String]) -> Result<ExecOutput, ContainerError> {
        let output = self.invoke(args, 0).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ContainerError::CommandFailed {
                command: self.describe(args),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }
}

#[async_trait]
impl ContainerClient for DockerCli {
    async fn create_network(&self, name: &str) -> Result<(), ContainerError> {
        self.invoke_checked(&args(&["network", "create", name])).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), ContainerError> {
        self.invoke_checked(&args(&["network", "rm", name])).await?;
        Ok(())
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError> {
        let output = self.invoke_checked(&run_args(spec, true)).await?;
        Ok(ContainerHandle {
            name: spec.name.clone(),
            id: output.stdout.trim().to_string(),
        })
    }

    async fn run(
        &self,
        spec: &ContainerSpec,
        timeout_secs: u64,
    ) -> Result<ExecOutput, ContainerError> {
        if spec.command.is_empty() && spec.entrypoint.is_none() {
            return Err(ContainerError::EmptyCommand);
        }
        self.invoke(&run_args(spec, false), timeout_secs).await
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        workdir: &str,
        command: &[String],
        timeout_secs: u64,
    ) -> Result<ExecOutput, ContainerError> {
        self.invoke(&exec_args(container, workdir, command)?, timeout_secs)
            .await
    }

    async fn remove(&self, container: &ContainerHandle) -> Result<(), ContainerError> {
        self.invoke_checked(&args(&["rm", "-f", &container.name]))
            .await?;
        Ok(())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Arguments for `docker run`: detached for services, `--rm` otherwise.
pub fn run_args(spec: &ContainerSpec, detach: bool) -> Vec<String> {
    let mut out = vec!["run".to_string()];
    out.push(if detach { "-d" } else { "--rm" }.to_string());
    out.extend(["--name".to_string(), spec.name.clone()]);

    if let Some(network) = &spec.network {
        out.extend(["--network".to_string(), network.clone()]);
        if let Some(alias) = &spec.alias {
            out.extend(["--network-alias".to_string(), alias.clone()]);
        }
    }

    for mount in &spec.mounts {
        let mut volume = format!("{}:{}", mount.host.display(), mount.container);
        if mount.read_only {
            volume.push_str(":ro");
        }
        out.extend(["-v".to_string(), volume]);
        for masked in mount.masked_paths() {
            out.extend(["-v".to_string(), masked]);
        }
    }

    if let Some(workdir) = &spec.workdir {
        out.extend(["-w".to_string(), workdir.clone()]);
    }

    for (key, value) in &spec.env {
        out.extend(["-e".to_string(), format!("{key}={value}")]);
    }

    if let Some(entrypoint) = &spec.entrypoint {
        out.extend(["--entrypoint".to_string(), entrypoint.clone()]);
    }

    out.push(spec.image.clone());
    out.extend(spec.command.iter().cloned());
    out
}

/// Arguments for `docker exec`.
pub fn exec_args(
    container: &ContainerHandle,
    workdir: &str,
    command: &[String],
) -> Result<Vec<String>, ContainerError> {
    if command.is_empty() {
        return Err(ContainerError::EmptyCommand);
    }
    let mut out = args(&["exec", "-w", workdir, &container.name]);
    out.extend(command.iter().cloned());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Mount;
    use std::collections::BTreeMap;

    fn handle(name: &str) -> ContainerHandle {
        ContainerHandle {
            name: name.to_string(),
            id: String::new(),
        }
    }

    #[test]
    fn test_run_args_for_service() {
        let mut env = BTreeMap::new();
        env.insert("A".to_string(), "1".to_string());
        let spec = ContainerSpec::new("e2e-x-grafana", "grafana/grafana:latest")
            .on_network("e2e-x", Some("grafana"))
            .with_mount(Mount::bind("/p/dist", "/var/lib/grafana/plugins/p").read_only())
            .with_env(&env);

        assert_eq!(
            run_args(&spec, true),
            [
                "run",
                "-d",
                "--name",
                "e2e-x-grafana",
                "--network",
                "e2e-x",
                "--network-alias",
                "grafana",
                "-v",
                "/p/dist:/var/lib/grafana/plugins/p:ro",
                "-e",
                "A=1",
                "grafana/grafana:latest",
            ]
        );
    }

    #[test]
    fn test_run_args_masks_excludes() {
        let spec = ContainerSpec::new("k6", "grafana/k6:latest")
            .with_mount(Mount::bind("/p", "/src").excluding(&["node_modules/".to_string()]))
            .with_workdir("/src")
            .with_command(vec!["k6".to_string(), "run".to_string()]);

        let args = run_args(&spec, false);
        assert_eq!(args[1], "--rm");
        let joined = args.join(" ");
        assert!(joined.contains("-v /p:/src -v /src/node_modules"));
        assert!(joined.ends_with("-w /src grafana/k6:latest k6 run"));
    }

    #[test]
    fn test_run_args_keep_alive() {
        let spec = ContainerSpec::new("b", "golang:1.20").keep_alive();
        let joined = run_args(&spec, true).join(" ");
        assert!(joined.ends_with("--entrypoint sleep golang:1.20 infinity"));
    }

    #[test]
    fn test_exec_args() {
        let cmd = vec!["mage".to_string(), "build:backend".to_string()];
        assert_eq!(
            exec_args(&handle("b"), "/src", &cmd).unwrap(),
            ["exec", "-w", "/src", "b", "mage", "build:backend"]
        );
        assert!(matches!(
            exec_args(&handle("b"), "/src", &[]),
            Err(ContainerError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_invoke_with_echo_binary() {
        // `echo` stands in for the engine and prints the arguments it was given.
        let cli = DockerCli::new("echo");
        let started = cli
            .start(&ContainerSpec::new("svc", "img"))
            .await
            .expect("start failed");
        assert_eq!(started.name, "svc");
        assert_eq!(started.id, "run -d --name svc img");
    }

    #[tokio::test]
    async fn test_engine_failure_is_command_failed() {
        let cli = DockerCli::new("false");
        let err = cli.create_network("n").await.unwrap_err();
        assert!(matches!(err, ContainerError::CommandFailed { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn test_workload_failure_is_reported_not_raised() {
        let cli = DockerCli::new("false");
        let out = cli
            .exec(&handle("b"), "/src", &["true".to_string()], 0)
            .await
            .expect("exec should not error");
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = DockerCli::new("/nonexistent/docker-binary");
        let err = cli.create_network("n").await.unwrap_err();
        assert!(matches!(err, ContainerError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_engine_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("docker");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = DockerCli::new(&script.to_string_lossy());
        let spec = ContainerSpec::new("k6", "grafana/k6").with_command(vec!["k6".to_string()]);
        let err = cli.run(&spec, 1).await.unwrap_err();

        match err {
            ContainerError::Timeout {
                command,
                timeout_secs,
            } => {
                assert_eq!(timeout_secs, 1);
                assert!(command.contains("run --rm --name k6"), "got: {command}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_without_command_is_rejected() {
        let cli = DockerCli::new("echo");
        let err = cli
            .run(&ContainerSpec::new("t", "img"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::EmptyCommand));
    }
}
