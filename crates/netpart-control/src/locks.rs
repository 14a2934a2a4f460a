// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-instance advisory locks.
//!
//! Serializes callers inside one process that touch the same instance, e.g. a
//! topology change racing a kill. Locks do not protect against other
//! processes driving the same runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held locks; released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct InstanceGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// Registry of per-instance mutexes keyed by owned name.
#[derive(Clone, Default)]
pub struct InstanceLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl InstanceLocks {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, name: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(name.to_string()).or_default().clone()
    }

    /// Lock one instance.
    pub async fn lock(&self, name: &str) -> InstanceGuard {
        let guard = self.handle(name).await.lock_owned().await;
        InstanceGuard {
            _guards: vec![guard],
        }
    }

    /// Lock two instances, always in name order so that concurrent callers
    /// with swapped arguments cannot deadlock.
    pub async fn lock_pair(&self, a: &str, b: &str) -> InstanceGuard {
        if a == b {
            return self.lock(a).await;
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let g1 = self.handle(first).await.lock_owned().await;
        let g2 = self.handle(second).await.lock_owned().await;
        InstanceGuard {
            _guards: vec![g1, g2],
        }
    }

    /// Drop entries nobody holds or waits on.
    pub async fn prune(&self) {
        let mut map = self.inner.lock().await;
        map.retain(|_, m| Arc::strong_count(m) > 1);
    }

    /// Number of tracked entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no entries are tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_excludes_second_holder() {
        let locks = InstanceLocks::new();
        let guard = locks.lock("netpart-a").await;

        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.lock("netpart-a").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_pair_locks_do_not_deadlock() {
        let locks = InstanceLocks::new();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let locks = locks.clone();
            tasks.push(tokio::spawn(async move {
                let (a, b) = if i % 2 == 0 {
                    ("netpart-a", "netpart-b")
                } else {
                    ("netpart-b", "netpart-a")
                };
                let _g = locks.lock_pair(a, b).await;
                tokio::task::yield_now().await;
            }));
        }

        let all = futures::future::join_all(tasks);
        let results = tokio::time::timeout(Duration::from_secs(5), all).await.unwrap();
        assert!(results.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_same_name_pair_locks_once() {
        let locks = InstanceLocks::new();
        let _g = locks.lock_pair("netpart-a", "netpart-a").await;
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_entries() {
        let locks = InstanceLocks::new();
        let held = locks.lock("netpart-a").await;
        drop(locks.lock("netpart-b").await);

        locks.prune().await;
        assert_eq!(locks.len().await, 1);

        drop(held);
        locks.prune().await;
        assert!(locks.is_empty().await);
    }
}
