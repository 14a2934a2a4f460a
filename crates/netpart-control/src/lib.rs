// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Netpart Control - Partition Test Harness Control Plane
//!
//! This crate provisions PostgreSQL instances as containers with dedicated
//! networks, switches connectivity between pairs of instances on and off,
//! and drives the instances through logical replication so that propagation
//! can be observed while the network is partitioned.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Callers (netpart-ctl, integration tests)             │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        ControlPlane (facade)                         │
//! │  ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌─────────────┐ ┌───────┐  │
//! │  │ Registry │ │ Lifecycle │ │ Topology │ │ Replication │ │  KV   │  │
//! │  └──────────┘ └───────────┘ └──────────┘ └─────────────┘ └───────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │             │            │              │           │
//!            ▼             ▼            ▼              ▼           ▼
//! ┌──────────────────────────────────────────┐  ┌─────────────────────────┐
//! │  ContainerRuntime (docker CLI / mock)     │  │  SQL endpoint per       │
//! │  containers + networks named netpart-*    │  │  instance (sqlx)        │
//! └──────────────────────────────────────────┘  └─────────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `create_instance` | Create container and network, attach, bootstrap KV schema |
//! | `list_instances` | Reconcile containers and networks into instances |
//! | `get_instance` | Look up one instance by name |
//! | `kill_instance` | Remove an instance's container and network |
//! | `cleanup_all` | Remove every owned container, then every owned network |
//! | `connect_instances` | Attach the higher instance to the lower instance's network |
//! | `disconnect_instances` | Detach it again |
//! | `get_connection` | Read the attachment from the runtime |
//! | `setup_primary` | Create the publication |
//! | `setup_standby` | Create the subscription to a primary |
//! | `restart_standby` | Re-enable a disabled subscription |
//! | `get_replication_data` | Read both replication views |
//! | `put` / `get` | Write and read the KV probe table |
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NETPART_DOCKER_BIN` | `docker` | Container runtime CLI |
//! | `DOCKER_HOST` | - | Runtime endpoint passed to the CLI |
//! | `POSTGRES_IMAGE` | `postgres:16.3-alpine3.20` | Default instance image |
//! | `NETPART_SQL_HOST` | `127.0.0.1` | Host where published ports are reachable |
//! | `NETPART_SQL_USER` | `postgres` | Instance superuser |
//! | `NETPART_SQL_PASSWORD` | `postgres` | Instance superuser password |
//! | `NETPART_SQL_DATABASE` | `main` | Instance database |
//! | `NETPART_CONNECT_TIMEOUT_MS` | `30000` | Deadline for SQL connects and runtime ping |
//! | `NETPART_RETRY_INITIAL_MS` | `100` | First retry delay |
//! | `NETPART_RETRY_MAX_MS` | `2000` | Retry delay cap |

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Control plane facade.
pub mod control_plane;

/// Instance entity.
pub mod instance;

/// Key/value probe.
pub mod kv;

/// Instance lifecycle: provision, kill, cleanup.
pub mod lifecycle;

/// Per-instance advisory locks.
pub mod locks;

/// Naming convention and SQL identifier sanitizing.
pub mod naming;

/// Reconciliation of runtime inventory into instances.
pub mod registry;

/// Logical replication roles.
pub mod replication;

/// Bounded retry with backoff.
pub mod retry;

/// Container runtime backends.
pub mod runtime;

/// SQL endpoint connections.
pub mod sql;

/// Pairwise instance connectivity.
pub mod topology;

pub use config::Config;
pub use control_plane::{ControlPlane, ControlPlaneBuilder};
pub use error::{ConsistencyFault, Error, ErrorKind, Result};
pub use instance::Instance;
pub use kv::KvRecord;
pub use replication::ReplicationData;
