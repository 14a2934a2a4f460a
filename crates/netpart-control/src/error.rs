// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for netpart-control.

use serde::Serialize;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Reconciliation found runtime state that does not form a valid instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyFault {
    /// An owned network exists without a matching container.
    #[error("found unused network: {name} ({network_id})")]
    OrphanNetwork {
        /// Network name.
        name: String,
        /// Runtime network ID.
        network_id: String,
    },

    /// An owned container exists without its dedicated network.
    #[error("found unconnected container: {name} ({container_id})")]
    UnconnectedInstance {
        /// Container name.
        name: String,
        /// Runtime container ID.
        container_id: String,
    },

    /// An owned container does not publish the SQL port.
    #[error("container {name} ({container_id}) does not publish its SQL port")]
    UnpublishedPort {
        /// Container name.
        name: String,
        /// Runtime container ID.
        container_id: String,
    },
}

/// Control plane errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The container runtime could not be reached before the deadline.
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A container or network could not be created or started.
    #[error("Failed to create {resource} {name}: {source}")]
    ResourceCreation {
        /// Kind of resource ("container" or "network").
        resource: &'static str,
        /// Resource name.
        name: String,
        /// Underlying runtime error.
        source: RuntimeError,
    },

    /// A container or network could not be removed.
    #[error("Failed to remove {resource} {name}: {source}")]
    ResourceRemoval {
        /// Kind of resource ("container" or "network").
        resource: &'static str,
        /// Resource name.
        name: String,
        /// Underlying runtime error.
        source: RuntimeError,
    },

    /// The container started but no host port was bound to the SQL port.
    #[error("Failed to bind instance port for {0}")]
    PortBinding(String),

    /// Runtime state could not be reconciled into instances.
    #[error("Consistency fault: {0}")]
    Consistency(#[from] ConsistencyFault),

    /// The named instance does not exist.
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// Attaching or detaching a container was rejected by the runtime.
    #[error("Failed to {operation} {higher} and {lower}: {source}")]
    Topology {
        /// "connect", "disconnect" or "inspect".
        operation: &'static str,
        /// Lower instance of the canonical pair.
        lower: String,
        /// Higher instance of the canonical pair.
        higher: String,
        /// Underlying runtime error.
        source: RuntimeError,
    },

    /// Publication or subscription DDL failed.
    #[error("Replication setup failed on {instance}: {source}")]
    ReplicationSetup {
        /// Instance the statement ran against.
        instance: String,
        /// Underlying database error.
        source: sqlx::Error,
    },

    /// The SQL endpoint could not be reached within the retry budget.
    #[error("Could not connect to {instance} after {attempts} attempt(s): {message}")]
    SqlConnection {
        /// Instance whose endpoint was dialed.
        instance: String,
        /// Number of connection attempts made.
        attempts: u32,
        /// Last connection error.
        message: String,
    },

    /// One or more removals failed during bulk cleanup.
    #[error("Cleanup failed for {failed} resource(s), first error: {first}")]
    PartialCleanup {
        /// Number of removals that failed.
        failed: usize,
        /// First failure observed.
        first: String,
    },

    /// An instance name was rejected.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Runtime call failed outside of a more specific context.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Stable error discriminant for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`Error::Config`].
    Config,
    /// See [`Error::RuntimeUnavailable`].
    RuntimeUnavailable,
    /// See [`Error::ResourceCreation`].
    ResourceCreation,
    /// See [`Error::ResourceRemoval`].
    ResourceRemoval,
    /// See [`Error::PortBinding`].
    PortBinding,
    /// See [`Error::Consistency`].
    ConsistencyFault,
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::Topology`].
    Topology,
    /// See [`Error::ReplicationSetup`].
    ReplicationSetup,
    /// See [`Error::SqlConnection`].
    SqlConnection,
    /// See [`Error::PartialCleanup`].
    PartialCleanup,
    /// See [`Error::InvalidName`] and [`Error::InvalidRequest`].
    InvalidRequest,
    /// See [`Error::Cancelled`].
    Cancelled,
    /// See [`Error::Runtime`].
    Runtime,
    /// See [`Error::Database`].
    Database,
}

impl Error {
    /// Discriminant for mapping to status codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::RuntimeUnavailable(_) => ErrorKind::RuntimeUnavailable,
            Error::ResourceCreation { .. } => ErrorKind::ResourceCreation,
            Error::ResourceRemoval { .. } => ErrorKind::ResourceRemoval,
            Error::PortBinding(_) => ErrorKind::PortBinding,
            Error::Consistency(_) => ErrorKind::ConsistencyFault,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Topology { .. } => ErrorKind::Topology,
            Error::ReplicationSetup { .. } => ErrorKind::ReplicationSetup,
            Error::SqlConnection { .. } => ErrorKind::SqlConnection,
            Error::PartialCleanup { .. } => ErrorKind::PartialCleanup,
            Error::InvalidName(_) | Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Database(_) => ErrorKind::Database,
        }
    }

    /// Whether the error text may contain backend credentials or internals.
    ///
    /// Connection and replication failures can echo connection strings.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Error::SqlConnection { .. } | Error::ReplicationSetup { .. } | Error::Database(_)
        )
    }

    pub(crate) fn creation(resource: &'static str, name: &str, source: RuntimeError) -> Self {
        match source {
            RuntimeError::Cancelled => Error::Cancelled,
            source => Error::ResourceCreation {
                resource,
                name: name.to_string(),
                source,
            },
        }
    }

    pub(crate) fn removal(resource: &'static str, name: &str, source: RuntimeError) -> Self {
        match source {
            RuntimeError::Cancelled => Error::Cancelled,
            source => Error::ResourceRemoval {
                resource,
                name: name.to_string(),
                source,
            },
        }
    }
}

/// Result type using the control plane Error.
pub type Result<T> = std::result::Result<T, Error>;
