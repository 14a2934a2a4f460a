// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control plane facade.
//!
//! [`ControlPlane`] exposes every operation a caller (the CLI, a test, or a
//! request layer) needs, one method each. Every method takes a
//! [`CancellationToken`] that is raced against each blocking call.
//!
//! ```rust,ignore
//! use netpart_control::{Config, ControlPlane};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let cp = ControlPlane::connect(Config::from_env()?, &cancel).await?;
//!
//! let db1 = cp.create_instance("db1", None, &cancel).await?;
//! let db2 = cp.create_instance("db2", None, &cancel).await?;
//! cp.connect_instances(&db1, &db2, &cancel).await?;
//! cp.setup_primary(&db1, &cancel).await?;
//! cp.setup_standby(&db2, &db1, &cancel).await?;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::instance::Instance;
use crate::kv::{KvProbe, KvRecord};
use crate::lifecycle::LifecycleManager;
use crate::locks::InstanceLocks;
use crate::naming;
use crate::registry::InstanceRegistry;
use crate::replication::{ReplicationController, ReplicationData};
use crate::retry::cancellable;
use crate::runtime::{ContainerRuntime, DockerCli, wait_for_runtime};
use crate::sql::SqlEndpoint;
use crate::topology::TopologyController;

/// Builder for creating a [`ControlPlane`].
#[derive(Default)]
pub struct ControlPlaneBuilder {
    config: Option<Config>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl ControlPlaneBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    ///
    /// Default: [`Config::default()`]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the container runtime.
    ///
    /// Default: [`DockerCli`] built from the configuration.
    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the control plane. Does not contact the runtime.
    pub fn build(self) -> ControlPlane {
        let config = self.config.unwrap_or_default();
        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(DockerCli::from_config(&config)));
        ControlPlane::assemble(config, runtime)
    }
}

/// Entry point for every instance, topology, replication and KV operation.
#[derive(Clone)]
pub struct ControlPlane {
    config: Config,
    runtime: Arc<dyn ContainerRuntime>,
    registry: InstanceRegistry,
    lifecycle: LifecycleManager,
    topology: TopologyController,
    replication: ReplicationController,
    kv: KvProbe,
    locks: InstanceLocks,
}

impl ControlPlane {
    /// Create a builder.
    pub fn builder() -> ControlPlaneBuilder {
        ControlPlaneBuilder::new()
    }

    fn assemble(config: Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let sql = SqlEndpoint::new(config.sql.clone(), config.retry);
        Self {
            registry: InstanceRegistry::new(runtime.clone()),
            lifecycle: LifecycleManager::new(runtime.clone(), config.sql.clone()),
            topology: TopologyController::new(runtime.clone()),
            replication: ReplicationController::new(sql.clone()),
            kv: KvProbe::new(sql),
            locks: InstanceLocks::new(),
            runtime,
            config,
        }
    }

    /// Build a Docker-backed control plane and wait until the runtime answers,
    /// bounded by the configured retry deadline.
    pub async fn connect(config: Config, cancel: &CancellationToken) -> Result<Self> {
        let plane = Self::builder().config(config).build();
        plane.wait_until_ready(cancel).await?;
        Ok(plane)
    }

    /// Wait for the runtime to answer a ping.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<()> {
        wait_for_runtime(self.runtime.as_ref(), &self.config.retry, cancel).await
    }

    /// Image used when `create_instance` is given none.
    pub fn default_image(&self) -> &str {
        &self.config.default_image
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Provision an instance and create its KV schema.
    ///
    /// `name` may be bare (`db1`) or already carry the `netpart-` prefix
    /// (`netpart-db1`); both create `netpart-db1`. The prefix is never
    /// applied twice.
    pub async fn create_instance(
        &self,
        name: &str,
        image: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Instance> {
        let owned = naming::resolve_name(name)?;
        let image = image.unwrap_or(&self.config.default_image);
        let _guard = self.locks.lock(&owned).await;

        let instance = self.lifecycle.provision(&owned, image, cancel).await?;
        self.replication.bootstrap(&instance, cancel).await?;
        info!(name = %instance.name, port = instance.port, "Instance created");
        Ok(instance)
    }

    /// All instances, sorted by name.
    pub async fn list_instances(&self, cancel: &CancellationToken) -> Result<Vec<Instance>> {
        cancellable(cancel, self.registry.list()).await?
    }

    /// One instance by bare or prefixed name.
    pub async fn get_instance(&self, name: &str, cancel: &CancellationToken) -> Result<Instance> {
        let owned = naming::resolve_name(name)?;
        cancellable(cancel, self.registry.get(&owned)).await?
    }

    /// Remove an instance's container and network.
    pub async fn kill_instance(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        let guard = self.locks.lock(&instance.name).await;
        let result = self.lifecycle.kill(instance, cancel).await;
        drop(guard);
        self.locks.prune().await;
        result
    }

    /// Remove every owned container, then every owned network.
    pub async fn cleanup_all(&self, cancel: &CancellationToken) -> Result<()> {
        let result = self.lifecycle.cleanup_all(cancel).await;
        self.locks.prune().await;
        result
    }

    /// Connect two instances.
    pub async fn connect_instances(
        &self,
        a: &Instance,
        b: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.locks.lock_pair(&a.name, &b.name).await;
        self.topology.connect(a, b, cancel).await
    }

    /// Disconnect two instances.
    pub async fn disconnect_instances(
        &self,
        a: &Instance,
        b: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.locks.lock_pair(&a.name, &b.name).await;
        self.topology.disconnect(a, b, cancel).await
    }

    /// Whether two instances are connected.
    pub async fn get_connection(
        &self,
        a: &Instance,
        b: &Instance,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let _guard = self.locks.lock_pair(&a.name, &b.name).await;
        self.topology.get_connection(a, b, cancel).await
    }

    /// Make an instance a primary.
    pub async fn setup_primary(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        let _guard = self.locks.lock(&instance.name).await;
        self.replication.setup_primary(instance, cancel).await
    }

    /// Make `instance` a standby of `primary`.
    pub async fn setup_standby(
        &self,
        instance: &Instance,
        primary: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.locks.lock_pair(&instance.name, &primary.name).await;
        self.replication.setup_standby(instance, primary, cancel).await
    }

    /// Re-enable a standby's subscription.
    pub async fn restart_standby(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        let _guard = self.locks.lock(&instance.name).await;
        self.replication.restart_standby(instance, cancel).await
    }

    /// Replication status of an instance.
    pub async fn get_replication_data(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<ReplicationData> {
        self.replication.replication_data(instance, cancel).await
    }

    /// Upsert a KV record.
    pub async fn put(
        &self,
        instance: &Instance,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.kv.put(instance, key, value, cancel).await
    }

    /// All KV records, sorted by key.
    pub async fn get(&self, instance: &Instance, cancel: &CancellationToken) -> Result<Vec<KvRecord>> {
        self.kv.get(instance, cancel).await
    }
}
