// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker CLI runtime.
//!
//! Drives the `docker` binary (or a CLI-compatible one such as `podman`)
//! through `tokio::process::Command`. Child processes are killed when the
//! calling future is dropped, so wrapping a call in a cancellation race
//! terminates the CLI as well.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::traits::*;
use crate::config::Config;

/// Container runtime backed by the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
    host: Option<String>,
}

impl DockerCli {
    /// Create a runtime that invokes `bin`, optionally against `host`.
    pub fn new(bin: impl Into<String>, host: Option<String>) -> Self {
        Self {
            bin: bin.into(),
            host,
        }
    }

    /// Create a runtime from control plane configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.docker_bin.clone(), config.docker_host.clone())
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(host) = &self.host {
            cmd.env("DOCKER_HOST", host);
        }
        cmd
    }

    /// Run the CLI and return trimmed stdout.
    async fn run(&self, args: Vec<String>) -> Result<String> {
        let line = redacted_command(&args);
        debug!(bin = %self.bin, command = %line, "Running runtime command");

        let output = self.command(&args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(line, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn inspect_many(&self, ids: &[String]) -> Result<Vec<ContainerInfo>> {
        let mut args = vec!["container".to_string(), "inspect".to_string()];
        args.extend(ids.iter().cloned());
        let stdout = self.run(args).await?;
        parse_container_inspect(&stdout)
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Render an argv for logs and errors with `--env` values masked; they carry
/// the SQL credentials.
fn redacted_command(args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len());
    let mut env_value = false;
    for arg in args {
        if env_value {
            let key = arg.split_once('=').map_or(arg.as_str(), |(k, _)| k);
            parts.push(format!("{}=***", key));
        } else {
            parts.push(arg.clone());
        }
        env_value = arg == "--env";
    }
    parts.join(" ")
}

/// Map well-known CLI error messages onto typed runtime errors.
fn classify_failure(command: String, stderr: String) -> RuntimeError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("no such container") || lower.contains("no such network") {
        RuntimeError::NotFound(stderr)
    } else if lower.contains("network") && lower.contains("not found") {
        RuntimeError::NotFound(stderr)
    } else if lower.contains("already exists in network") || lower.contains("is already connected")
    {
        RuntimeError::AlreadyAttached(stderr)
    } else if lower.contains("is not connected to") {
        RuntimeError::NotAttached(stderr)
    } else if lower.contains("has active endpoints") {
        RuntimeError::InUse(stderr)
    } else {
        RuntimeError::CommandFailed { command, stderr }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    id: String,
    name: String,
    state: InspectedState,
    network_settings: InspectedNetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedState {
    running: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetworkSettings {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<InspectedPortBinding>>>>,
    #[serde(default)]
    networks: Option<HashMap<String, InspectedEndpoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedPortBinding {
    #[serde(default)]
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct InspectedEndpoint {
    #[serde(rename = "NetworkID", default)]
    network_id: String,
}

#[derive(Debug, Deserialize)]
struct NetworkLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

impl From<InspectedContainer> for ContainerInfo {
    fn from(c: InspectedContainer) -> Self {
        let mut ports = BTreeMap::new();
        for (key, bindings) in c.network_settings.ports.unwrap_or_default() {
            // keys look like "5432/tcp"
            let Some(container_port) = key.split('/').next().and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            let host_port = bindings
                .unwrap_or_default()
                .iter()
                .filter_map(|b| b.host_port.parse::<u16>().ok())
                .find(|p| *p != 0);
            if let Some(host_port) = host_port {
                ports.insert(container_port, host_port);
            }
        }

        let mut networks: Vec<NetworkAttachment> = c
            .network_settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| NetworkAttachment {
                name,
                network_id: endpoint.network_id,
            })
            .collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));

        ContainerInfo {
            id: c.id,
            name: c.name.trim_start_matches('/').to_string(),
            running: c.state.running,
            ports,
            networks,
        }
    }
}

fn parse_container_inspect(stdout: &str) -> Result<Vec<ContainerInfo>> {
    let inspected: Vec<InspectedContainer> = serde_json::from_str(stdout)?;
    Ok(inspected.into_iter().map(ContainerInfo::from).collect())
}

fn parse_network_lines(stdout: &str) -> Result<Vec<NetworkInfo>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            let line: NetworkLine = serde_json::from_str(l)?;
            Ok(NetworkInfo {
                id: line.id,
                name: line.name,
            })
        })
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.run(args(["version", "--format", "{{.Server.Version}}"]))
            .await
            .map(|_| ())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut argv = args(["create", "--name", spec.name.as_str()]);
        for label in &spec.labels {
            argv.push("--label".to_string());
            argv.push(label.clone());
        }
        for (key, value) in &spec.env {
            argv.push("--env".to_string());
            argv.push(format!("{}={}", key, value));
        }
        // no host port given: the runtime picks an unused one
        argv.push("--publish".to_string());
        argv.push(spec.publish_port.to_string());
        argv.push(spec.image.clone());
        argv.extend(spec.command.iter().cloned());

        let id = self.run(argv).await?;
        if id.is_empty() {
            return Err(RuntimeError::Malformed(
                "create returned no container ID".to_string(),
            ));
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run(args(["start", id])).await.map(|_| ())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        self.inspect_many(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        // -v drops the anonymous data volume declared by the image
        let argv = if force {
            args(["rm", "--force", "--volumes", id])
        } else {
            args(["rm", "--volumes", id])
        };
        self.run(argv).await.map(|_| ())
    }

    async fn list_containers(&self, all: bool, name_filter: &str) -> Result<Vec<ContainerInfo>> {
        let filter = format!("name={}", name_filter);
        let mut argv = args(["ps", "--quiet", "--no-trunc", "--filter", filter.as_str()]);
        if all {
            argv.push("--all".to_string());
        }

        let stdout = self.run(argv).await?;
        let ids: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        match self.inspect_many(&ids).await {
            Ok(found) => Ok(found),
            // A container vanished between `ps` and `inspect`; inspect one by one.
            Err(RuntimeError::NotFound(_)) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in &ids {
                    match self.inspect_container(id).await {
                        Ok(info) => found.push(info),
                        Err(RuntimeError::NotFound(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(found)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_network(&self, name: &str, labels: &[String]) -> Result<String> {
        let mut argv = args(["network", "create"]);
        for label in labels {
            argv.push("--label".to_string());
            argv.push(label.clone());
        }
        argv.push(name.to_string());

        let id = self.run(argv).await?;
        if id.is_empty() {
            return Err(RuntimeError::Malformed(
                "network create returned no ID".to_string(),
            ));
        }
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        self.run(args(["network", "rm", id])).await.map(|_| ())
    }

    async fn list_networks(&self, name_filter: &str) -> Result<Vec<NetworkInfo>> {
        let filter = format!("name={}", name_filter);
        let stdout = self
            .run(args([
                "network",
                "ls",
                "--no-trunc",
                "--filter",
                filter.as_str(),
                "--format",
                "{{json .}}",
            ]))
            .await?;
        parse_network_lines(&stdout)
    }

    async fn connect_network(&self, network_id: &str, container_id: &str) -> Result<()> {
        self.run(args(["network", "connect", network_id, container_id]))
            .await
            .map(|_| ())
    }

    async fn disconnect_network(
        &self,
        network_id: &str,
        container_id: &str,
        force: bool,
    ) -> Result<()> {
        let argv = if force {
            args(["network", "disconnect", "--force", network_id, container_id])
        } else {
            args(["network", "disconnect", network_id, container_id])
        };
        self.run(argv).await.map(|_| ())
    }
}
