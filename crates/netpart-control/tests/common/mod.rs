// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for netpart-control tests.
//!
//! Provides mock-backed and Docker-backed contexts. Docker-backed tests need a
//! reachable container runtime and the `TEST_NETPART_POSTGRES_IMAGE`
//! variable; they share one host, so they run one at a time.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use netpart_control::config::SqlSettings;
use netpart_control::lifecycle::LifecycleManager;
use netpart_control::retry::RetryPolicy;
use netpart_control::runtime::MockRuntime;
use netpart_control::{Config, ControlPlane, Instance};

/// Skip the current test unless a container runtime is configured.
#[allow(unused_macros)]
macro_rules! skip_if_no_runtime {
    () => {
        if std::env::var("TEST_NETPART_POSTGRES_IMAGE").is_err() {
            eprintln!("Skipping test: TEST_NETPART_POSTGRES_IMAGE not set");
            return;
        }
    };
}

/// Serializes tests that call `cleanup_all` on the shared runtime.
static SERIAL: Mutex<()> = Mutex::const_new(());

/// Control plane over an in-memory runtime.
pub struct MockContext {
    pub runtime: MockRuntime,
    pub plane: ControlPlane,
    pub lifecycle: LifecycleManager,
    pub cancel: CancellationToken,
}

impl MockContext {
    pub fn new() -> Self {
        let runtime = MockRuntime::new();
        let config = Config::default().with_retry(RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            deadline: Duration::from_millis(50),
        });
        let plane = ControlPlane::builder()
            .config(config)
            .runtime(Arc::new(runtime.clone()))
            .build();
        let lifecycle = LifecycleManager::new(Arc::new(runtime.clone()), SqlSettings::default());

        Self {
            runtime,
            plane,
            lifecycle,
            cancel: CancellationToken::new(),
        }
    }

    /// Provision without schema bootstrap; the mock has no SQL endpoint.
    pub async fn provision(&self, name: &str) -> Instance {
        self.lifecycle
            .provision(name, "postgres:mock", &self.cancel)
            .await
            .expect("provision failed")
    }
}

/// Control plane over the real container runtime.
pub struct DockerContext {
    pub plane: ControlPlane,
    pub image: String,
    pub cancel: CancellationToken,
    _serial: MutexGuard<'static, ()>,
}

impl DockerContext {
    /// Take the serial lock, connect, and start from an empty host.
    pub async fn new() -> Result<Self, String> {
        let image = std::env::var("TEST_NETPART_POSTGRES_IMAGE")
            .map_err(|_| "TEST_NETPART_POSTGRES_IMAGE not set")?;
        let serial = SERIAL.lock().await;

        let config = Config::from_env()
            .map_err(|e| format!("Invalid configuration: {}", e))?
            .with_default_image(image.clone());
        let cancel = CancellationToken::new();

        let plane = ControlPlane::connect(config, &cancel)
            .await
            .map_err(|e| format!("Failed to reach container runtime: {}", e))?;
        plane
            .cleanup_all(&cancel)
            .await
            .map_err(|e| format!("Initial cleanup failed: {}", e))?;

        Ok(Self {
            plane,
            image,
            cancel,
            _serial: serial,
        })
    }

    pub async fn create(&self, name: &str) -> Instance {
        self.plane
            .create_instance(name, Some(&self.image), &self.cancel)
            .await
            .unwrap_or_else(|e| panic!("create_instance({}) failed: {}", name, e))
    }

    pub async fn teardown(self) {
        if let Err(e) = self.plane.cleanup_all(&self.cancel).await {
            eprintln!("Cleanup after test failed: {}", e);
        }
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
