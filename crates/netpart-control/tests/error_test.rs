// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for error types and their presentation mapping.

use netpart_control::config::ConfigError;
use netpart_control::runtime::RuntimeError;
use netpart_control::{ConsistencyFault, Error, ErrorKind};

// ============================================================================
// Display Tests
// ============================================================================

#[test]
fn test_orphan_network_display() {
    let err: Error = ConsistencyFault::OrphanNetwork {
        name: "netpart-ghost".to_string(),
        network_id: "abc123".to_string(),
    }
    .into();
    let msg = format!("{}", err);
    assert!(msg.contains("Consistency fault"));
    assert!(msg.contains("unused network"));
    assert!(msg.contains("netpart-ghost"));
}

#[test]
fn test_unconnected_instance_display() {
    let err: Error = ConsistencyFault::UnconnectedInstance {
        name: "netpart-lonely".to_string(),
        container_id: "c1".to_string(),
    }
    .into();
    assert!(err.to_string().contains("unconnected container: netpart-lonely"));
}

#[test]
fn test_resource_creation_display() {
    let err = Error::ResourceCreation {
        resource: "network",
        name: "netpart-db1".to_string(),
        source: RuntimeError::CommandFailed {
            command: "network create netpart-db1".to_string(),
            stderr: "network with name netpart-db1 already exists".to_string(),
        },
    };
    let msg = err.to_string();
    assert!(msg.starts_with("Failed to create network netpart-db1"));
    assert!(msg.contains("already exists"));
}

#[test]
fn test_topology_display_names_both_instances() {
    let err = Error::Topology {
        operation: "connect",
        lower: "netpart-a".to_string(),
        higher: "netpart-b".to_string(),
        source: RuntimeError::NotFound("netpart-a".to_string()),
    };
    let msg = err.to_string();
    assert!(msg.contains("Failed to connect netpart-b and netpart-a"));
}

#[test]
fn test_partial_cleanup_display() {
    let err = Error::PartialCleanup {
        failed: 3,
        first: "Failed to remove container netpart-a: boom".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("3 resource(s)"));
    assert!(msg.contains("netpart-a"));
}

#[test]
fn test_port_binding_display() {
    let err = Error::PortBinding("netpart-db1".to_string());
    assert_eq!(err.to_string(), "Failed to bind instance port for netpart-db1");
}

#[test]
fn test_config_error_conversion() {
    let err: Error = ConfigError::InvalidValue {
        var: "NETPART_RETRY_MAX_MS",
        reason: "invalid digit found in string".to_string(),
    }
    .into();
    assert!(err.to_string().contains("NETPART_RETRY_MAX_MS"));
    assert_eq!(err.kind(), ErrorKind::Config);
}

// ============================================================================
// Kind Mapping Tests
// ============================================================================

#[test]
fn test_each_taxonomy_entry_has_distinct_kind() {
    let cases = vec![
        (Error::RuntimeUnavailable("down".into()), ErrorKind::RuntimeUnavailable),
        (Error::PortBinding("x".into()), ErrorKind::PortBinding),
        (Error::NotFound("x".into()), ErrorKind::NotFound),
        (
            Error::SqlConnection {
                instance: "x".into(),
                attempts: 1,
                message: "refused".into(),
            },
            ErrorKind::SqlConnection,
        ),
        (
            Error::PartialCleanup {
                failed: 1,
                first: "x".into(),
            },
            ErrorKind::PartialCleanup,
        ),
        (Error::InvalidName("x".into()), ErrorKind::InvalidRequest),
        (Error::InvalidRequest("x".into()), ErrorKind::InvalidRequest),
        (Error::Cancelled, ErrorKind::Cancelled),
        (
            Error::Runtime(RuntimeError::Malformed("x".into())),
            ErrorKind::Runtime,
        ),
    ];

    for (err, kind) in cases {
        assert_eq!(err.kind(), kind, "wrong kind for {}", err);
    }
}

#[test]
fn test_runtime_error_converts_to_runtime_kind() {
    let err: Error = RuntimeError::InUse("netpart-a".to_string()).into();
    assert!(matches!(err, Error::Runtime(RuntimeError::InUse(_))));
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(!err.is_sensitive());
}

#[test]
fn test_kind_serialization() {
    let kinds = [
        (ErrorKind::ResourceCreation, "resource_creation"),
        (ErrorKind::ReplicationSetup, "replication_setup"),
        (ErrorKind::PartialCleanup, "partial_cleanup"),
    ];
    for (kind, expected) in kinds {
        assert_eq!(serde_json::to_value(kind).unwrap(), expected);
    }
}
