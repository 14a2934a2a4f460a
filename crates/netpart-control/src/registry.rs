// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance Registry
//!
//! Joins the independently listed container and network inventories into
//! [`Instance`] values. Nothing is cached: every call reads the runtime.
//! Inconsistent inventories are reported as [`ConsistencyFault`]s and never
//! repaired here.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SQL_PORT;
use crate::error::{ConsistencyFault, Error, Result};
use crate::instance::Instance;
use crate::naming::{self, PREFIX};
use crate::runtime::{ContainerInfo, ContainerRuntime, NetworkInfo};

/// Read-only view over owned runtime resources.
#[derive(Clone)]
pub struct InstanceRegistry {
    runtime: Arc<dyn ContainerRuntime>,
}

impl InstanceRegistry {
    /// Create a registry over `runtime`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// List every instance, sorted by name.
    ///
    /// Only running containers count; a stopped container whose network
    /// still exists shows up as an orphan network.
    pub async fn list(&self) -> Result<Vec<Instance>> {
        let containers = self.runtime.list_containers(false, PREFIX).await?;
        let networks = self.runtime.list_networks(PREFIX).await?;
        debug!(
            containers = containers.len(),
            networks = networks.len(),
            "Reconciling runtime inventory"
        );

        reconcile(containers, networks).inspect_err(|e| {
            warn!(error = %e, "Runtime inventory is inconsistent");
        })
    }

    /// Look up one instance by owned name.
    pub async fn get(&self, name: &str) -> Result<Instance> {
        self.list()
            .await?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

struct PartialInstance {
    container_id: String,
    port: u16,
    network_id: Option<String>,
}

/// Join containers and networks by name into instances.
///
/// Resources without the naming prefix are ignored. The first fault in name
/// order is returned, so the outcome does not depend on listing order.
pub fn reconcile(containers: Vec<ContainerInfo>, networks: Vec<NetworkInfo>) -> Result<Vec<Instance>> {
    let mut partial: BTreeMap<String, PartialInstance> = BTreeMap::new();

    let mut owned_containers: Vec<ContainerInfo> = containers
        .into_iter()
        .filter(|c| naming::is_owned(&c.name))
        .collect();
    owned_containers.sort_by(|a, b| a.name.cmp(&b.name));

    for container in owned_containers {
        let Some(port) = container.host_port(SQL_PORT) else {
            return Err(ConsistencyFault::UnpublishedPort {
                name: container.name,
                container_id: container.id,
            }
            .into());
        };
        partial.insert(
            container.name,
            PartialInstance {
                container_id: container.id,
                port,
                network_id: None,
            },
        );
    }

    let mut owned_networks: Vec<NetworkInfo> = networks
        .into_iter()
        .filter(|n| naming::is_owned(&n.name))
        .collect();
    owned_networks.sort_by(|a, b| a.name.cmp(&b.name));

    for network in owned_networks {
        match partial.get_mut(&network.name) {
            Some(entry) => entry.network_id = Some(network.id),
            None => {
                return Err(ConsistencyFault::OrphanNetwork {
                    name: network.name,
                    network_id: network.id,
                }
                .into());
            }
        }
    }

    partial
        .into_iter()
        .map(|(name, entry)| match entry.network_id {
            Some(network_id) => Ok(Instance {
                name,
                container_id: entry.container_id,
                network_id,
                port: entry.port,
            }),
            None => Err(ConsistencyFault::UnconnectedInstance {
                name,
                container_id: entry.container_id,
            }
            .into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str, id: &str, port: Option<u16>) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            name: name.to_string(),
            running: true,
            ports: port.map(|p| BTreeMap::from([(SQL_PORT, p)])).unwrap_or_default(),
            networks: Vec::new(),
        }
    }

    fn network(name: &str, id: &str) -> NetworkInfo {
        NetworkInfo {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_reconcile_joins_by_name_and_sorts() {
        let instances = reconcile(
            vec![
                container("netpart-b", "cb", Some(2)),
                container("netpart-a", "ca", Some(1)),
            ],
            vec![network("netpart-a", "na"), network("netpart-b", "nb")],
        )
        .unwrap();

        let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["netpart-a", "netpart-b"]);
        assert_eq!(instances[0].container_id, "ca");
        assert_eq!(instances[0].network_id, "na");
        assert_eq!(instances[0].port, 1);
    }

    #[test]
    fn test_reconcile_ignores_foreign_resources() {
        let instances = reconcile(
            vec![container("postgres", "x", Some(5)), container("netpart-a", "ca", Some(1))],
            vec![network("bridge", "b0"), network("netpart-a", "na"), network("mynetpart-a", "z")],
        )
        .unwrap();
        assert_eq!(instances.len(), 1);
    }

    #[test]
    fn test_reconcile_orphan_network() {
        let err = reconcile(vec![], vec![network("netpart-ghost", "ng")]).unwrap_err();
        match err {
            Error::Consistency(ConsistencyFault::OrphanNetwork { name, network_id }) => {
                assert_eq!(name, "netpart-ghost");
                assert_eq!(network_id, "ng");
            }
            other => panic!("expected orphan network, got {:?}", other),
        }
    }

    #[test]
    fn test_reconcile_unconnected_instance() {
        let err = reconcile(vec![container("netpart-a", "ca", Some(1))], vec![]).unwrap_err();
        assert!(matches!(
            err,
            Error::Consistency(ConsistencyFault::UnconnectedInstance { .. })
        ));
    }

    #[test]
    fn test_reconcile_unpublished_port() {
        let err = reconcile(
            vec![container("netpart-a", "ca", None)],
            vec![network("netpart-a", "na")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Consistency(ConsistencyFault::UnpublishedPort { .. })
        ));
    }

    #[test]
    fn test_reconcile_empty() {
        assert!(reconcile(vec![], vec![]).unwrap().is_empty());
    }
}
