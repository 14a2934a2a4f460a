// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime module - compute unit and network backends.

pub mod docker;
pub mod mock;
mod traits;

pub use docker::DockerCli;
pub use mock::MockRuntime;
pub use traits::*;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Error;
use crate::retry::{RetryError, RetryPolicy, retry};

/// Block until the runtime answers a ping, bounded by `policy`.
pub async fn wait_for_runtime(
    runtime: &dyn ContainerRuntime,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> crate::error::Result<()> {
    match retry(policy, cancel, "runtime ping", || runtime.ping()).await {
        Ok(()) => {
            info!(runtime = runtime.runtime_type(), "Container runtime connected");
            Ok(())
        }
        Err(RetryError::Cancelled) => Err(Error::Cancelled),
        Err(RetryError::Exhausted { attempts, last }) => {
            let reason = last
                .map(|e| e.to_string())
                .unwrap_or_else(|| "ping timed out".to_string());
            warn!(attempts, reason = %reason, "Container runtime unreachable");
            Err(Error::RuntimeUnavailable(format!(
                "{} after {} attempt(s)",
                reason, attempts
            )))
        }
    }
}
