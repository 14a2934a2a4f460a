// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime trait definitions.
//!
//! Defines the abstract interface for the compute and network backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from runtime operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The runtime CLI exited with a non-zero status.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed {
        /// Command line that failed (without the binary).
        command: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The referenced container or network does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The container is already attached to the network.
    #[error("Already attached: {0}")]
    AlreadyAttached(String),

    /// The container is not attached to the network.
    #[error("Not attached: {0}")]
    NotAttached(String),

    /// The network still has attached containers.
    #[error("Resource in use: {0}")]
    InUse(String),

    /// The runtime output could not be parsed.
    #[error("Malformed runtime output: {0}")]
    Malformed(String),

    /// The call was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment variables.
    pub env: Vec<(String, String)>,
    /// Command override (empty keeps the image default).
    pub command: Vec<String>,
    /// Container port to publish on an ephemeral host port.
    pub publish_port: u16,
    /// Labels in `key=value` form.
    pub labels: Vec<String>,
}

/// One network membership of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Network name.
    pub name: String,
    /// Runtime network ID.
    pub network_id: String,
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Runtime container ID.
    pub id: String,
    /// Container name, without any leading slash.
    pub name: String,
    /// Whether the container is running.
    pub running: bool,
    /// Published ports: container port to host port.
    pub ports: BTreeMap<u16, u16>,
    /// Current network memberships.
    pub networks: Vec<NetworkAttachment>,
}

impl ContainerInfo {
    /// Host port bound to `container_port`, if any.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    /// Whether the container is attached to `network_id`.
    pub fn is_attached_to(&self, network_id: &str) -> bool {
        self.networks.iter().any(|n| n.network_id == network_id)
    }
}

/// Network state as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Runtime network ID.
    pub id: String,
    /// Network name.
    pub name: String,
}

/// Trait for container runtimes.
///
/// Runtimes are pure executors of compute and network operations. They hold
/// no view of instances; reconciliation happens in the registry.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime type identifier (e.g., "docker", "mock")
    fn runtime_type(&self) -> &'static str;

    /// Check that the runtime is reachable.
    async fn ping(&self) -> Result<()>;

    /// Create (but do not start) a container. Returns its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Inspect a container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;

    /// Remove a container, killing it first when `force` is set.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// List containers whose name contains `name_filter`.
    ///
    /// Only running containers are returned unless `all` is set.
    async fn list_containers(&self, all: bool, name_filter: &str) -> Result<Vec<ContainerInfo>>;

    /// Create a network. Returns its ID.
    async fn create_network(&self, name: &str, labels: &[String]) -> Result<String>;

    /// Remove a network.
    async fn remove_network(&self, id: &str) -> Result<()>;

    /// List networks whose name contains `name_filter`.
    async fn list_networks(&self, name_filter: &str) -> Result<Vec<NetworkInfo>>;

    /// Attach a container to a network.
    async fn connect_network(&self, network_id: &str, container_id: &str) -> Result<()>;

    /// Detach a container from a network.
    async fn disconnect_network(
        &self,
        network_id: &str,
        container_id: &str,
        force: bool,
    ) -> Result<()>;
}
