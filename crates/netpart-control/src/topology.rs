// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pairwise connectivity between instances.
//!
//! Two instances are connected iff the container of the higher-named
//! instance is attached to the dedicated network of the lower-named one.
//! Names are compared as byte strings, so the order is total and does not
//! depend on any listing order. Connectivity is never cached; every query
//! inspects the runtime.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::retry::cancellable;
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Two distinct instances ordered by name.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalPair<'a> {
    /// Instance whose network carries the edge.
    pub lower: &'a Instance,
    /// Instance whose container is attached to the lower network.
    pub higher: &'a Instance,
}

impl<'a> CanonicalPair<'a> {
    /// Order `a` and `b`. A pair of an instance with itself is rejected.
    pub fn new(a: &'a Instance, b: &'a Instance) -> Result<Self> {
        match a.name.cmp(&b.name) {
            std::cmp::Ordering::Less => Ok(Self { lower: a, higher: b }),
            std::cmp::Ordering::Greater => Ok(Self { lower: b, higher: a }),
            std::cmp::Ordering::Equal => Err(Error::InvalidRequest(format!(
                "cannot pair instance {} with itself",
                a.name
            ))),
        }
    }

    fn failure(&self, operation: &'static str, source: RuntimeError) -> Error {
        match source {
            RuntimeError::Cancelled => Error::Cancelled,
            source => Error::Topology {
                operation,
                lower: self.lower.name.clone(),
                higher: self.higher.name.clone(),
                source,
            },
        }
    }
}

/// Attaches and detaches instance containers to and from peer networks.
#[derive(Clone)]
pub struct TopologyController {
    runtime: Arc<dyn ContainerRuntime>,
}

impl TopologyController {
    /// Create a controller over `runtime`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Connect two instances. Connecting an already connected pair succeeds.
    pub async fn connect(
        &self,
        a: &Instance,
        b: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pair = CanonicalPair::new(a, b)?;
        if self.is_attached(&pair, cancel).await? {
            debug!(lower = %pair.lower.name, higher = %pair.higher.name, "Already connected");
            return Ok(());
        }

        match cancellable(
            cancel,
            self.runtime
                .connect_network(&pair.lower.network_id, &pair.higher.container_id),
        )
        .await?
        {
            Ok(()) | Err(RuntimeError::AlreadyAttached(_)) => {
                info!(lower = %pair.lower.name, higher = %pair.higher.name, "Instances connected");
                Ok(())
            }
            Err(e) => Err(pair.failure("connect", e)),
        }
    }

    /// Disconnect two instances, forcing the detach. Disconnecting a pair
    /// that is not connected succeeds.
    pub async fn disconnect(
        &self,
        a: &Instance,
        b: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pair = CanonicalPair::new(a, b)?;

        match cancellable(
            cancel,
            self.runtime.disconnect_network(
                &pair.lower.network_id,
                &pair.higher.container_id,
                true,
            ),
        )
        .await?
        {
            Ok(()) => {
                info!(lower = %pair.lower.name, higher = %pair.higher.name, "Instances disconnected");
                Ok(())
            }
            Err(RuntimeError::NotAttached(_)) => {
                debug!(lower = %pair.lower.name, higher = %pair.higher.name, "Already disconnected");
                Ok(())
            }
            Err(e) => Err(pair.failure("disconnect", e)),
        }
    }

    /// Whether two instances are connected, read fresh from the runtime.
    pub async fn get_connection(
        &self,
        a: &Instance,
        b: &Instance,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let pair = CanonicalPair::new(a, b)?;
        self.is_attached(&pair, cancel).await
    }

    async fn is_attached(&self, pair: &CanonicalPair<'_>, cancel: &CancellationToken) -> Result<bool> {
        let info = cancellable(cancel, self.runtime.inspect_container(&pair.higher.container_id))
            .await?
            .map_err(|e| pair.failure("inspect", e))?;
        Ok(info.is_attached_to(&pair.lower.network_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(name: &str) -> Instance {
        Instance {
            name: name.to_string(),
            container_id: format!("c-{}", name),
            network_id: format!("n-{}", name),
            port: 1,
        }
    }

    #[test]
    fn test_canonical_pair_is_order_independent() {
        let a = inst("netpart-a");
        let b = inst("netpart-b");

        let p1 = CanonicalPair::new(&a, &b).unwrap();
        let p2 = CanonicalPair::new(&b, &a).unwrap();
        assert_eq!(p1.lower.name, "netpart-a");
        assert_eq!(p2.lower.name, "netpart-a");
        assert_eq!(p1.higher.name, p2.higher.name);
    }

    #[test]
    fn test_canonical_pair_uses_byte_order() {
        // uppercase sorts before lowercase, digits before letters
        let upper = inst("netpart-Z");
        let lower = inst("netpart-a");
        let digit = inst("netpart-9");

        assert_eq!(CanonicalPair::new(&lower, &upper).unwrap().lower.name, "netpart-Z");
        assert_eq!(CanonicalPair::new(&upper, &digit).unwrap().lower.name, "netpart-9");
    }

    #[test]
    fn test_self_pair_rejected() {
        let a = inst("netpart-a");
        let err = CanonicalPair::new(&a, &a.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
