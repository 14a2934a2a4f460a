// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Key/value probe used to observe replication.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::instance::Instance;
use crate::replication::close;
use crate::retry::cancellable;
use crate::sql::SqlEndpoint;

/// One row of the `kv` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KvRecord {
    /// Primary key.
    pub key: String,
    /// Stored value.
    pub value: String,
}

impl KvRecord {
    /// Build a record.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Reads and writes the `kv` table of an instance.
#[derive(Debug, Clone)]
pub struct KvProbe {
    sql: SqlEndpoint,
}

impl KvProbe {
    /// Create a probe.
    pub fn new(sql: SqlEndpoint) -> Self {
        Self { sql }
    }

    /// Insert or replace `key`.
    pub async fn put(
        &self,
        instance: &Instance,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut conn = self.sql.connect(instance, cancel).await?;
        cancellable(
            cancel,
            sqlx::query(
                r#"
                INSERT INTO kv (key, value) VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut conn),
        )
        .await??;
        close(conn).await;
        debug!(instance = %instance.name, key = %key, "Record written");
        Ok(())
    }

    /// All records, ordered by key bytewise so the order is independent of
    /// the database collation.
    pub async fn get(&self, instance: &Instance, cancel: &CancellationToken) -> Result<Vec<KvRecord>> {
        let mut conn = self.sql.connect(instance, cancel).await?;
        let records = cancellable(
            cancel,
            sqlx::query_as::<_, KvRecord>(
                r#"
                SELECT key, COALESCE(value, '') AS value
                FROM kv
                ORDER BY key COLLATE "C" ASC
                "#,
            )
            .fetch_all(&mut conn),
        )
        .await??;
        close(conn).await;
        Ok(records)
    }
}
