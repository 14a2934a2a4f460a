// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The orchestrated database instance.

use serde::{Deserialize, Serialize};

use crate::naming;

/// One database server: a container, its dedicated network, and the host port
/// bound to its SQL endpoint.
///
/// Instances are snapshots; the runtime is the only source of truth. Role
/// (primary or standby) is not stored here, it lives inside the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    /// Owned name, including the naming prefix.
    pub name: String,
    /// Runtime container ID.
    pub container_id: String,
    /// Runtime ID of the dedicated network named like the instance.
    pub network_id: String,
    /// Host-side port bound to the SQL endpoint.
    pub port: u16,
}

impl Instance {
    /// Name without the naming prefix.
    pub fn bare_name(&self) -> &str {
        naming::bare_name(&self.name)
    }
}
