// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock runtime for testing.
//!
//! Keeps containers and networks in memory and mirrors the Docker behaviours
//! the control plane depends on: a network with attached containers cannot
//! be removed, attaching twice and detaching an absent attachment are
//! rejected, and forced container removal drops its attachments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

/// Mock container state.
#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    running: bool,
    ports: BTreeMap<u16, u16>,
    networks: Vec<String>,
}

#[derive(Debug, Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    networks: HashMap<String, String>,
    next_id: u64,
    next_port: u16,
    events: Vec<String>,
    fail_remove: HashSet<String>,
    fail_start: bool,
    withhold_port: bool,
    unreachable: bool,
}

impl MockState {
    fn allocate_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("mock-{}-{:04}", kind, self.next_id)
    }

    fn allocate_port(&mut self) -> u16 {
        self.next_port += 1;
        self.next_port
    }

    fn network_name(&self, id: &str) -> Option<&str> {
        self.networks.get(id).map(String::as_str)
    }

    fn info(&self, id: &str, c: &MockContainer) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            name: c.name.clone(),
            running: c.running,
            // unbound ports (0) are not reported, as with the real runtime
            ports: c
                .ports
                .iter()
                .filter(|(_, host)| **host != 0)
                .map(|(k, v)| (*k, *v))
                .collect(),
            networks: c
                .networks
                .iter()
                .map(|nid| NetworkAttachment {
                    name: self.network_name(nid).unwrap_or_default().to_string(),
                    network_id: nid.clone(),
                })
                .collect(),
        }
    }
}

/// Mock runtime for testing.
#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Create a new, empty mock runtime.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_port: 49152,
                ..MockState::default()
            })),
        }
    }

    /// Create a mock runtime that fails every ping.
    pub fn unreachable() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_port: 49152,
                unreachable: true,
                ..MockState::default()
            })),
        }
    }

    /// Make removal of the container or network called `name` fail.
    pub async fn fail_removal_of(&self, name: &str) {
        self.state.lock().await.fail_remove.insert(name.to_string());
    }

    /// Make every container start fail.
    pub async fn fail_starts(&self, fail: bool) {
        self.state.lock().await.fail_start = fail;
    }

    /// Start containers without binding any host port.
    pub async fn withhold_ports(&self, withhold: bool) {
        self.state.lock().await.withhold_port = withhold;
    }

    /// Insert a bare network, bypassing the control plane. Returns its ID.
    pub async fn insert_network(&self, name: &str) -> String {
        let mut state = self.state.lock().await;
        let id = state.allocate_id("net");
        state.networks.insert(id.clone(), name.to_string());
        id
    }

    /// Insert a running container with a bound port, bypassing the control plane.
    pub async fn insert_container(&self, name: &str, port: Option<u16>) -> String {
        let mut state = self.state.lock().await;
        let id = state.allocate_id("ctr");
        let ports = match port {
            Some(p) => BTreeMap::from([(p, state.allocate_port())]),
            None => BTreeMap::new(),
        };
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: name.to_string(),
                running: true,
                ports,
                networks: Vec::new(),
            },
        );
        id
    }

    /// Mark the container called `name` as exited.
    pub async fn stop_container(&self, name: &str) {
        let mut state = self.state.lock().await;
        if let Some(c) = state.containers.values_mut().find(|c| c.name == name) {
            c.running = false;
        }
    }

    /// Number of containers currently known.
    pub async fn container_count(&self) -> usize {
        self.state.lock().await.containers.len()
    }

    /// Number of networks currently known.
    pub async fn network_count(&self) -> usize {
        self.state.lock().await.networks.len()
    }

    /// Successful mutating calls, in the order they were applied
    /// (e.g. `"rm netpart-db1"`, `"network rm netpart-db1"`).
    pub async fn events(&self) -> Vec<String> {
        self.state.lock().await.events.clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn runtime_type(&self) -> &'static str {
        "mock"
    }

    async fn ping(&self) -> Result<()> {
        if self.state.lock().await.unreachable {
            return Err(RuntimeError::CommandFailed {
                command: "version".to_string(),
                stderr: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("create --name {}", spec.name),
                stderr: format!("Conflict. The container name \"/{}\" is already in use", spec.name),
            });
        }

        let id = state.allocate_id("ctr");
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: spec.name.clone(),
                running: false,
                ports: BTreeMap::from([(spec.publish_port, 0)]),
                networks: Vec::new(),
            },
        );
        state.events.push(format!("create {}", spec.name));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_start {
            return Err(RuntimeError::CommandFailed {
                command: format!("start {}", id),
                stderr: "OCI runtime create failed".to_string(),
            });
        }

        let withhold = state.withhold_port;
        let mut allocated = Vec::new();
        let Some(container) = state.containers.get(id) else {
            return Err(RuntimeError::NotFound(id.to_string()));
        };
        let name = container.name.clone();
        let container_ports: Vec<u16> = container.ports.keys().copied().collect();
        if !withhold {
            for port in container_ports {
                allocated.push((port, state.allocate_port()));
            }
        }

        if let Some(container) = state.containers.get_mut(id) {
            container.running = true;
            if withhold {
                container.ports.clear();
            } else {
                container.ports.extend(allocated);
            }
        }
        state.events.push(format!("start {}", name));
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let state = self.state.lock().await;
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        Ok(state.info(id, container))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(container) = state.containers.get(id) else {
            return Err(RuntimeError::NotFound(id.to_string()));
        };
        let name = container.name.clone();
        if state.fail_remove.contains(&name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("rm {}", id),
                stderr: "removal of container is already in progress".to_string(),
            });
        }
        if container.running && !force {
            return Err(RuntimeError::CommandFailed {
                command: format!("rm {}", id),
                stderr: "cannot remove a running container".to_string(),
            });
        }

        state.containers.remove(id);
        state.events.push(format!("rm {}", name));
        Ok(())
    }

    async fn list_containers(&self, all: bool, name_filter: &str) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock().await;
        let mut found: Vec<ContainerInfo> = state
            .containers
            .iter()
            .filter(|(_, c)| c.name.contains(name_filter) && (all || c.running))
            .map(|(id, c)| state.info(id, c))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn create_network(&self, name: &str, _labels: &[String]) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.networks.values().any(|n| n == name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("network create {}", name),
                stderr: format!("network with name {} already exists", name),
            });
        }
        let id = state.allocate_id("net");
        state.networks.insert(id.clone(), name.to_string());
        state.events.push(format!("network create {}", name));
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(name) = state.network_name(id).map(String::from) else {
            return Err(RuntimeError::NotFound(id.to_string()));
        };
        if state.fail_remove.contains(&name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("network rm {}", id),
                stderr: "error while removing network".to_string(),
            });
        }
        if state
            .containers
            .values()
            .any(|c| c.networks.iter().any(|n| n == id))
        {
            return Err(RuntimeError::InUse(format!(
                "network {} id {} has active endpoints",
                name, id
            )));
        }

        state.networks.remove(id);
        state.events.push(format!("network rm {}", name));
        Ok(())
    }

    async fn list_networks(&self, name_filter: &str) -> Result<Vec<NetworkInfo>> {
        let state = self.state.lock().await;
        let mut found: Vec<NetworkInfo> = state
            .networks
            .iter()
            .filter(|(_, name)| name.contains(name_filter))
            .map(|(id, name)| NetworkInfo {
                id: id.clone(),
                name: name.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn connect_network(&self, network_id: &str, container_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(net_name) = state.network_name(network_id).map(String::from) else {
            return Err(RuntimeError::NotFound(network_id.to_string()));
        };
        let Some(container) = state.containers.get_mut(container_id) else {
            return Err(RuntimeError::NotFound(container_id.to_string()));
        };
        if container.networks.iter().any(|n| n == network_id) {
            return Err(RuntimeError::AlreadyAttached(format!(
                "endpoint with name {} already exists in network {}",
                container.name, net_name
            )));
        }
        container.networks.push(network_id.to_string());
        let event = format!("network connect {} {}", net_name, container.name);
        state.events.push(event);
        Ok(())
    }

    async fn disconnect_network(
        &self,
        network_id: &str,
        container_id: &str,
        _force: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(net_name) = state.network_name(network_id).map(String::from) else {
            return Err(RuntimeError::NotFound(network_id.to_string()));
        };
        let Some(container) = state.containers.get_mut(container_id) else {
            return Err(RuntimeError::NotFound(container_id.to_string()));
        };
        let before = container.networks.len();
        container.networks.retain(|n| n != network_id);
        if container.networks.len() == before {
            return Err(RuntimeError::NotAttached(format!(
                "container {} is not connected to network {}",
                container.name, net_name
            )));
        }
        let event = format!("network disconnect {} {}", net_name, container.name);
        state.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "postgres:test".to_string(),
            env: Vec::new(),
            command: Vec::new(),
            publish_port: 5432,
            labels: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_start_binds_port() {
        let rt = MockRuntime::new();
        let id = rt.create_container(&spec("netpart-a")).await.unwrap();
        let before = rt.inspect_container(&id).await.unwrap();
        assert!(!before.running);
        assert_eq!(before.host_port(5432), None);

        rt.start_container(&id).await.unwrap();
        let after = rt.inspect_container(&id).await.unwrap();
        assert!(after.running);
        assert!(after.host_port(5432).is_some());
    }

    #[tokio::test]
    async fn test_withheld_port() {
        let rt = MockRuntime::new();
        rt.withhold_ports(true).await;
        let id = rt.create_container(&spec("netpart-a")).await.unwrap();
        rt.start_container(&id).await.unwrap();
        assert_eq!(rt.inspect_container(&id).await.unwrap().host_port(5432), None);
    }

    #[tokio::test]
    async fn test_network_in_use_cannot_be_removed() {
        let rt = MockRuntime::new();
        let cid = rt.create_container(&spec("netpart-a")).await.unwrap();
        let nid = rt.create_network("netpart-a", &[]).await.unwrap();
        rt.connect_network(&nid, &cid).await.unwrap();

        let err = rt.remove_network(&nid).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InUse(_)));

        rt.remove_container(&cid, true).await.unwrap();
        rt.remove_network(&nid).await.unwrap();
        assert_eq!(rt.network_count().await, 0);
    }

    #[tokio::test]
    async fn test_double_attach_and_absent_detach_rejected() {
        let rt = MockRuntime::new();
        let cid = rt.create_container(&spec("netpart-a")).await.unwrap();
        let nid = rt.create_network("netpart-b", &[]).await.unwrap();

        rt.connect_network(&nid, &cid).await.unwrap();
        assert!(matches!(
            rt.connect_network(&nid, &cid).await,
            Err(RuntimeError::AlreadyAttached(_))
        ));

        rt.disconnect_network(&nid, &cid, true).await.unwrap();
        assert!(matches!(
            rt.disconnect_network(&nid, &cid, true).await,
            Err(RuntimeError::NotAttached(_))
        ));
    }

    #[tokio::test]
    async fn test_list_running_only_unless_all() {
        let rt = MockRuntime::new();
        rt.insert_container("netpart-up", Some(5432)).await;
        rt.insert_container("netpart-down", Some(5432)).await;
        rt.insert_container("other", Some(5432)).await;
        rt.stop_container("netpart-down").await;

        let running = rt.list_containers(false, "netpart-").await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name, "netpart-up");

        let all = rt.list_containers(true, "netpart-").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_ping() {
        assert!(MockRuntime::unreachable().ping().await.is_err());
        assert!(MockRuntime::new().ping().await.is_ok());
    }
}
