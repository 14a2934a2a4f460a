// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle: provisioning, kill and bulk cleanup.
//!
//! No step rolls back earlier steps on failure. Leftovers from a failed
//! provision are removed by [`LifecycleManager::cleanup_all`].

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{SQL_PORT, SqlSettings};
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::naming::{self, MANAGED_LABEL, PREFIX};
use crate::retry::cancellable;
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Container,
    Network,
}

impl ResourceKind {
    fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::Network => "network",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates and destroys instances on the runtime.
#[derive(Clone)]
pub struct LifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
    sql: SqlSettings,
}

impl LifecycleManager {
    /// Create a lifecycle manager. `sql` supplies the credentials injected
    /// into every new instance.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, sql: SqlSettings) -> Self {
        Self { runtime, sql }
    }

    fn container_spec(&self, name: &str, image: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: image.to_string(),
            env: vec![
                ("POSTGRES_USER".to_string(), self.sql.user.clone()),
                ("POSTGRES_PASSWORD".to_string(), self.sql.password.clone()),
                ("POSTGRES_DB".to_string(), self.sql.database.clone()),
            ],
            command: vec![
                "postgres".to_string(),
                "-c".to_string(),
                "wal_level=logical".to_string(),
            ],
            publish_port: SQL_PORT,
            labels: vec![MANAGED_LABEL.to_string()],
        }
    }

    /// Create, start and network an instance. Schema bootstrap is not
    /// part of this step.
    ///
    /// Steps run in order and stop at the first failure: create container,
    /// start it, discover its bound host port, create the dedicated network,
    /// attach the container to it.
    #[instrument(skip(self, image, cancel), fields(image = %image))]
    pub async fn provision(
        &self,
        name: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<Instance> {
        let name = naming::resolve_name(name)?;
        let spec = self.container_spec(&name, image);

        let container_id = cancellable(cancel, self.runtime.create_container(&spec))
            .await?
            .map_err(|e| Error::creation("container", &name, e))?;
        debug!(name = %name, container_id = %container_id, "Container created");

        cancellable(cancel, self.runtime.start_container(&container_id))
            .await?
            .map_err(|e| Error::creation("container", &name, e))?;

        let info = cancellable(cancel, self.runtime.inspect_container(&container_id)).await??;
        let port = info
            .host_port(SQL_PORT)
            .ok_or_else(|| Error::PortBinding(name.clone()))?;

        let network_id = cancellable(
            cancel,
            self.runtime
                .create_network(&name, &[MANAGED_LABEL.to_string()]),
        )
        .await?
        .map_err(|e| Error::creation("network", &name, e))?;

        cancellable(cancel, self.runtime.connect_network(&network_id, &container_id))
            .await?
            .map_err(|e| Error::creation("network attachment", &name, e))?;

        info!(
            name = %name,
            container_id = %container_id,
            network_id = %network_id,
            port,
            "Instance provisioned"
        );

        Ok(Instance {
            name,
            container_id,
            network_id,
            port,
        })
    }

    /// Force-remove the instance's container, then its network.
    ///
    /// Peers still attached to the instance's network are detached first,
    /// since the runtime refuses to remove a network with endpoints.
    #[instrument(skip(self, instance, cancel), fields(name = %instance.name))]
    pub async fn kill(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        cancellable(
            cancel,
            self.runtime.remove_container(&instance.container_id, true),
        )
        .await?
        .map_err(|e| Error::removal("container", &instance.name, e))?;

        self.detach_peers(instance, cancel).await?;

        cancellable(cancel, self.runtime.remove_network(&instance.network_id))
            .await?
            .map_err(|e| Error::removal("network", &instance.name, e))?;

        info!(name = %instance.name, "Instance killed");
        Ok(())
    }

    async fn detach_peers(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        let peers = cancellable(cancel, self.runtime.list_containers(true, PREFIX)).await??;
        for peer in peers
            .iter()
            .filter(|p| p.id != instance.container_id && p.is_attached_to(&instance.network_id))
        {
            debug!(peer = %peer.name, network = %instance.name, "Detaching peer before network removal");
            match cancellable(
                cancel,
                self.runtime
                    .disconnect_network(&instance.network_id, &peer.id, true),
            )
            .await?
            {
                Ok(()) | Err(RuntimeError::NotAttached(_)) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => return Err(Error::removal("network attachment", &peer.name, e)),
            }
        }
        Ok(())
    }

    /// Remove every owned container, wait for all of them, then remove every
    /// owned network.
    ///
    /// Every removal is attempted even when others fail. Stopped containers
    /// are included. Resources that disappear before their removal runs count
    /// as removed.
    #[instrument(skip(self, cancel))]
    pub async fn cleanup_all(&self, cancel: &CancellationToken) -> Result<()> {
        let containers = cancellable(cancel, self.runtime.list_containers(true, PREFIX)).await??;
        let containers: Vec<(String, String)> = containers
            .into_iter()
            .filter(|c| naming::is_owned(&c.name))
            .map(|c| (c.id, c.name))
            .collect();

        let mut failures = self
            .remove_phase(ResourceKind::Container, containers, cancel)
            .await;

        // Networks are listed only after every container removal settled.
        match cancellable(cancel, self.runtime.list_networks(PREFIX)).await? {
            Ok(networks) => {
                let networks: Vec<(String, String)> = networks
                    .into_iter()
                    .filter(|n| naming::is_owned(&n.name))
                    .map(|n| (n.id, n.name))
                    .collect();
                failures.extend(
                    self.remove_phase(ResourceKind::Network, networks, cancel)
                        .await,
                );
            }
            Err(e) => {
                warn!(error = %e, "Failed to list networks for cleanup");
                failures.push(Error::Runtime(e));
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match failures.first() {
            None => {
                info!("Cleanup completed");
                Ok(())
            }
            Some(first) => Err(Error::PartialCleanup {
                failed: failures.len(),
                first: first.to_string(),
            }),
        }
    }

    /// Remove all `targets` in parallel and wait for every task.
    async fn remove_phase(
        &self,
        kind: ResourceKind,
        targets: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Vec<Error> {
        if targets.is_empty() {
            return Vec::new();
        }
        debug!(kind = %kind, count = targets.len(), "Removing resources");

        let (names, handles): (Vec<String>, Vec<_>) = targets
            .into_iter()
            .map(|(id, name)| {
                let handle = tokio::spawn(remove_one(
                    self.runtime.clone(),
                    kind,
                    id,
                    name.clone(),
                    cancel.clone(),
                ));
                (name, handle)
            })
            .unzip();

        let mut failures = Vec::new();
        for (name, result) in names.iter().zip(join_all(handles).await) {
            let outcome = result.unwrap_or_else(|join_err| {
                Err(Error::removal(
                    kind.as_str(),
                    name,
                    RuntimeError::Io(std::io::Error::other(join_err)),
                ))
            });
            if let Err(e) = outcome {
                warn!(kind = %kind, name = %name, error = %e, "Removal failed");
                failures.push(e);
            }
        }
        failures
    }
}

async fn remove_one(
    runtime: Arc<dyn ContainerRuntime>,
    kind: ResourceKind,
    id: String,
    name: String,
    cancel: CancellationToken,
) -> Result<()> {
    let removal = async {
        match kind {
            ResourceKind::Container => runtime.remove_container(&id, true).await,
            ResourceKind::Network => runtime.remove_network(&id).await,
        }
    };
    match cancellable(&cancel, removal).await? {
        Ok(()) => {
            debug!(kind = %kind, name = %name, "Removed");
            Ok(())
        }
        Err(RuntimeError::NotFound(_)) => {
            debug!(kind = %kind, name = %name, "Already gone");
            Ok(())
        }
        Err(e) => Err(Error::removal(kind.as_str(), &name, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    fn manager(rt: &MockRuntime) -> LifecycleManager {
        LifecycleManager::new(Arc::new(rt.clone()), SqlSettings::default())
    }

    #[test]
    fn test_container_spec_enables_logical_replication() {
        let mgr = manager(&MockRuntime::new());
        let spec = mgr.container_spec("netpart-db1", "postgres:16");
        assert_eq!(spec.publish_port, SQL_PORT);
        assert!(spec.command.iter().any(|a| a == "wal_level=logical"));
        assert!(spec
            .env
            .contains(&("POSTGRES_DB".to_string(), "main".to_string())));
        assert_eq!(spec.labels, vec![MANAGED_LABEL.to_string()]);
    }

    #[tokio::test]
    async fn test_provision_builds_attached_instance() {
        let rt = MockRuntime::new();
        let cancel = CancellationToken::new();
        let inst = manager(&rt).provision("db1", "img", &cancel).await.unwrap();

        assert_eq!(inst.name, "netpart-db1");
        let info = rt.inspect_container(&inst.container_id).await.unwrap();
        assert!(info.is_attached_to(&inst.network_id));
        assert_eq!(info.host_port(SQL_PORT), Some(inst.port));
    }

    #[tokio::test]
    async fn test_provision_start_failure_creates_no_network() {
        let rt = MockRuntime::new();
        rt.fail_starts(true).await;

        let err = manager(&rt)
            .provision("db1", "img", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceCreation { resource: "container", .. }));
        assert_eq!(rt.network_count().await, 0);
    }

    #[tokio::test]
    async fn test_provision_without_port_is_port_binding_failure() {
        let rt = MockRuntime::new();
        rt.withhold_ports(true).await;

        let err = manager(&rt)
            .provision("db1", "img", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PortBinding(ref n) if n == "netpart-db1"));
        assert_eq!(rt.network_count().await, 0);
    }

    #[tokio::test]
    async fn test_provision_cancelled() {
        let rt = MockRuntime::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = manager(&rt).provision("db1", "img", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(rt.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_kill_detaches_peers() {
        let rt = MockRuntime::new();
        let mgr = manager(&rt);
        let cancel = CancellationToken::new();
        let a = mgr.provision("a", "img", &cancel).await.unwrap();
        let b = mgr.provision("b", "img", &cancel).await.unwrap();
        rt.connect_network(&a.network_id, &b.container_id).await.unwrap();

        mgr.kill(&a, &cancel).await.unwrap();

        assert_eq!(rt.container_count().await, 1);
        assert_eq!(rt.network_count().await, 1);
        let b_info = rt.inspect_container(&b.container_id).await.unwrap();
        assert!(!b_info.is_attached_to(&a.network_id));
    }

    #[tokio::test]
    async fn test_cleanup_removes_containers_before_networks() {
        let rt = MockRuntime::new();
        let mgr = manager(&rt);
        let cancel = CancellationToken::new();
        for name in ["a", "b", "c"] {
            mgr.provision(name, "img", &cancel).await.unwrap();
        }
        rt.insert_container("unrelated", Some(SQL_PORT)).await;

        mgr.cleanup_all(&cancel).await.unwrap();

        let events = rt.events().await;
        let last_container_rm = events
            .iter()
            .rposition(|e| e.starts_with("rm "))
            .unwrap();
        let first_network_rm = events
            .iter()
            .position(|e| e.starts_with("network rm "))
            .unwrap();
        assert!(last_container_rm < first_network_rm);
        assert_eq!(rt.container_count().await, 1);
        assert_eq!(rt.network_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_attempts_everything_and_reports_first_failure() {
        let rt = MockRuntime::new();
        let mgr = manager(&rt);
        let cancel = CancellationToken::new();
        for name in ["a", "b"] {
            mgr.provision(name, "img", &cancel).await.unwrap();
        }
        rt.fail_removal_of("netpart-a").await;

        let err = mgr.cleanup_all(&cancel).await.unwrap_err();
        match err {
            // container a fails, then network a fails because a is still attached
            Error::PartialCleanup { failed, first } => {
                assert_eq!(failed, 2);
                assert!(first.contains("netpart-a"));
            }
            other => panic!("expected PartialCleanup, got {:?}", other),
        }
        // b was still fully removed
        let events = rt.events().await;
        assert!(events.contains(&"rm netpart-b".to_string()));
        assert!(events.contains(&"network rm netpart-b".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_on_empty_host() {
        let rt = MockRuntime::new();
        manager(&rt)
            .cleanup_all(&CancellationToken::new())
            .await
            .unwrap();
        assert!(rt.events().await.is_empty());
    }
}
