// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container lifecycle for prefill sessions (spec §4.M). `SPEC_FULL.md`'s
//! ambient-stack supplement makes this a CLI-backed [`ContainerEngine`]:
//! every operation shells out to the `docker` binary and parses its stdout,
//! the same "not a container runtime, drive it via its API" posture the
//! teacher's own `DockerAdapter` takes, just over a process boundary
//! instead of the HTTP socket.

use crate::error::{Result, SupervisorError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Which network a session container should join (spec §4.M step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Join the host's network namespace directly (used when the DNS
    /// container itself runs with host networking).
    Host,
    /// Join a named bridge/user network, optionally pinning a DNS server.
    Named(String),
    /// Docker's default bridge network.
    Default,
}

/// One bind mount: host path -> container path, optionally read-only.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl BindMount {
    pub fn rw(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self { host_path: host.into(), container_path: container.into(), read_only: false }
    }
}

/// Host port -> container port forwarding (used for the TCP daemon
/// transport fallback, spec §4.M step 5).
#[derive(Debug, Clone, Copy)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
}

/// Parameters to create a session container (spec §4.M steps 3-7).
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub mounts: Vec<BindMount>,
    pub network: NetworkMode,
    pub dns_server: Option<String>,
    /// Extra sysctls, e.g. `net.ipv6.conf.all.disable_ipv6=1` to stop IPv6
    /// from bypassing lancache DNS (spec §4.M step 4).
    pub sysctls: HashMap<String, String>,
    pub ports: Vec<PortBinding>,
    pub auto_remove: bool,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            env: HashMap::new(),
            mounts: Vec::new(),
            network: NetworkMode::Default,
            dns_server: None,
            sysctls: HashMap::new(),
            ports: Vec::new(),
            auto_remove: false,
        }
    }
}

/// Container state as reported by `docker inspect` (just what the session
/// manager needs; spec §4.M step 8 "if the container exited...").
#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub running: bool,
    pub exit_code: Option<i32>,
}

/// The narrow slice of container engine operations the prefill session
/// manager needs (spec §4.M, §6 "container runtime" external collaborator).
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn pull(&self, image: &str) -> Result<()>;
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start(&self, container_id: &str) -> Result<()>;
    async fn stop(&self, container_id: &str, wait_before_kill: Duration) -> Result<()>;
    async fn kill(&self, container_id: &str) -> Result<()>;
    async fn remove(&self, container_id: &str) -> Result<()>;
    async fn inspect(&self, container_id: &str) -> Result<ContainerStatus>;
    async fn logs(&self, container_id: &str, tail_lines: usize) -> Result<String>;
    async fn exec(&self, container_id: &str, cmd: &[&str]) -> Result<String>;
    /// Returns the container id of the named network's DNS container's own
    /// IP address on that network, if it exists (spec §4.M step 4).
    async fn network_ip(&self, network: &str, container_name: &str) -> Result<Option<String>>;
    /// List ids of containers whose name starts with `prefix` (orphan
    /// reconciliation, spec §4.M).
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    /// The host-side source path backing one of `container_id`'s mounts at
    /// `container_path`, if any. Used to translate our own bind-mounted
    /// directories to host paths before mounting them into a session
    /// container (spec §4.M step 3).
    async fn mount_source(&self, container_id: &str, container_path: &str) -> Result<Option<String>>;
}

/// `docker` CLI-backed implementation. Every call is a subprocess.
pub struct DockerCliEngine {
    binary: PathBuf,
}

impl DockerCliEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(args = ?args, "docker");
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| SupervisorError::Container(format!("docker {}: {e}", args.join(" "))))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SupervisorError::Container(format!(
                "docker {} failed: {stderr}",
                args.join(" ")
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerEngine for DockerCliEngine {
    async fn pull(&self, image: &str) -> Result<()> {
        match self.run(&["pull", image]).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(image, error = %e, "image pull failed, will fall back to cached image");
                Err(e)
            }
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let mut args: Vec<String> =
            vec!["create".into(), "--name".into(), spec.name.clone()];

        for (k, v) in &spec.env {
            args.push("-e".into());
            args.push(format!("{k}={v}"));
        }
        for mount in &spec.mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.push("-v".into());
            args.push(format!("{}:{}:{}", mount.host_path.display(), mount.container_path, mode));
        }
        for port in &spec.ports {
            args.push("-p".into());
            args.push(format!("{}:{}", port.host_port, port.container_port));
        }
        for (k, v) in &spec.sysctls {
            args.push("--sysctl".into());
            args.push(format!("{k}={v}"));
        }
        match &spec.network {
            NetworkMode::Host => {
                args.push("--network".into());
                args.push("host".into());
            }
            NetworkMode::Named(name) => {
                args.push("--network".into());
                args.push(name.clone());
            }
            NetworkMode::Default => {}
        }
        if let Some(dns) = &spec.dns_server {
            args.push("--dns".into());
            args.push(dns.clone());
        }
        if spec.auto_remove {
            args.push("--rm".into());
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await
    }

    async fn start(&self, container_id: &str) -> Result<()> {
        self.run(&["start", container_id]).await.map(|_| ())
    }

    async fn stop(&self, container_id: &str, wait_before_kill: Duration) -> Result<()> {
        let secs = wait_before_kill.as_secs().to_string();
        self.run(&["stop", "--time", &secs, container_id]).await.map(|_| ())
    }

    async fn kill(&self, container_id: &str) -> Result<()> {
        self.run(&["kill", container_id]).await.map(|_| ())
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        match self.run(&["rm", "-f", container_id]).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("No such container") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerStatus> {
        let out = self
            .run(&["inspect", "--format", "{{.State.Running}} {{.State.ExitCode}}", container_id])
            .await?;
        let mut parts = out.split_whitespace();
        let running = parts.next() == Some("true");
        let exit_code = parts.next().and_then(|s| s.parse().ok());
        Ok(ContainerStatus { running, exit_code })
    }

    async fn logs(&self, container_id: &str, tail_lines: usize) -> Result<String> {
        self.run(&["logs", "--tail", &tail_lines.to_string(), container_id]).await
    }

    async fn exec(&self, container_id: &str, cmd: &[&str]) -> Result<String> {
        let mut args = vec!["exec", container_id];
        args.extend_from_slice(cmd);
        self.run(&args).await
    }

    async fn network_ip(&self, network: &str, container_name: &str) -> Result<Option<String>> {
        let format = format!("{{{{(index .NetworkSettings.Networks \"{network}\").IPAddress}}}}");
        match self.run(&["inspect", "--format", &format, container_name]).await {
            Ok(ip) if !ip.is_empty() => Ok(Some(ip)),
            Ok(_) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let filter = format!("name={prefix}");
        let out = self.run(&["ps", "-a", "--filter", &filter, "--format", "{{.ID}}"]).await?;
        Ok(out.lines().map(str::to_string).filter(|s| !s.is_empty()).collect())
    }

    async fn mount_source(&self, container_id: &str, container_path: &str) -> Result<Option<String>> {
        let format =
            format!("{{{{range .Mounts}}}}{{{{if eq .Destination \"{container_path}\"}}}}{{{{.Source}}}}{{{{end}}}}{{{{end}}}}");
        match self.run(&["inspect", "--format", &format, container_id]).await {
            Ok(source) if !source.is_empty() => Ok(Some(source)),
            Ok(_) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
