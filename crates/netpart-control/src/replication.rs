// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Logical replication roles.
//!
//! Roles are facts inside each database, never stored by the control plane:
//!
//! | State      | Evidence                                         |
//! |------------|--------------------------------------------------|
//! | bootstrapped | `kv` table exists                              |
//! | primary    | publication `pub` exists                         |
//! | standby    | subscription `sub_<instance>` exists             |
//! | disabled   | subscription exists with `subenabled = false`    |
//!
//! Subscriptions are created with `disable_on_error`, so a partition turns a
//! standby into the disabled state until [`ReplicationController::restart_standby`]
//! re-enables it.

use serde::{Deserialize, Serialize};
use sqlx::Connection;
use sqlx::postgres::PgConnection;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::naming::SqlIdentifier;
use crate::retry::cancellable;
use crate::sql::{SqlEndpoint, sql_literal};

/// Schema created on every instance at bootstrap.
pub const KV_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv ( key text PRIMARY KEY, value text );";

/// Publication created on primaries.
pub const PUBLICATION: &str = "pub";

/// One row of the primary-side replication status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveReplication {
    /// Subscriber application name (the subscription name).
    pub application_name: String,
    /// WAL sender state, e.g. `streaming` or `catchup`.
    pub state: String,
    /// Synchronization state, e.g. `async`.
    pub sync_state: String,
}

/// One row of the standby-side subscription catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StandbySubscription {
    /// Subscription name.
    pub subname: String,
    /// Whether the subscription is enabled.
    pub subenabled: bool,
}

/// Replication status of one instance, from both sides.
///
/// Either list may be empty. Both are filled when an instance publishes and
/// subscribes at the same time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationData {
    /// Standbys currently streaming from this instance.
    pub active: Vec<ActiveReplication>,
    /// Subscriptions held by this instance.
    pub standby: Vec<StandbySubscription>,
}

/// Drives instances through the replication roles.
#[derive(Debug, Clone)]
pub struct ReplicationController {
    sql: SqlEndpoint,
}

impl ReplicationController {
    /// Create a controller.
    pub fn new(sql: SqlEndpoint) -> Self {
        Self { sql }
    }

    /// Create the KV schema, waiting for the server to accept connections.
    pub async fn bootstrap(&self, instance: &Instance, cancel: &CancellationToken) -> Result<()> {
        let mut conn = self.sql.connect(instance, cancel).await?;
        cancellable(cancel, sqlx::raw_sql(KV_SCHEMA).execute(&mut conn)).await??;
        close(conn).await;
        info!(instance = %instance.name, "Instance bootstrapped");
        Ok(())
    }

    /// Publish the KV table. Fails if the instance already is a primary.
    pub async fn setup_primary(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ddl = format!("CREATE PUBLICATION {} FOR TABLE kv;", PUBLICATION);
        self.run_ddl(instance, &ddl, cancel).await?;
        info!(instance = %instance.name, "Primary configured");
        Ok(())
    }

    /// Subscribe `instance` to `primary`'s publication.
    ///
    /// The subscription is named after the standby and reaches the primary
    /// by container name, so it only works while the two are connected.
    pub async fn setup_standby(
        &self,
        instance: &Instance,
        primary: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if instance.name == primary.name {
            return Err(Error::InvalidRequest(format!(
                "instance {} cannot subscribe to itself",
                instance.name
            )));
        }

        let subscription = SqlIdentifier::subscription_for(&instance.name)?;
        let ddl = format!(
            "CREATE SUBSCRIPTION {} CONNECTION {} PUBLICATION {} WITH (disable_on_error = true);",
            subscription,
            sql_literal(&self.sql.peer_conninfo(primary)),
            PUBLICATION,
        );
        self.run_ddl(instance, &ddl, cancel).await?;
        info!(
            instance = %instance.name,
            primary = %primary.name,
            subscription = subscription.as_str(),
            "Standby configured"
        );
        Ok(())
    }

    /// Re-enable the standby's subscription after it was disabled by an error.
    pub async fn restart_standby(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let subscription = SqlIdentifier::subscription_for(&instance.name)?;
        let ddl = format!("ALTER SUBSCRIPTION {} ENABLE;", subscription);
        self.run_ddl(instance, &ddl, cancel).await?;
        info!(instance = %instance.name, "Standby restarted");
        Ok(())
    }

    /// Read both replication views of an instance.
    pub async fn replication_data(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<ReplicationData> {
        let mut conn = self.sql.connect(instance, cancel).await?;

        let active = cancellable(
            cancel,
            sqlx::query_as::<_, ActiveReplication>(
                r#"
                SELECT COALESCE(application_name, '') AS application_name,
                       COALESCE(state, '') AS state,
                       COALESCE(sync_state, '') AS sync_state
                FROM pg_stat_replication
                ORDER BY application_name
                "#,
            )
            .fetch_all(&mut conn),
        )
        .await??;

        let standby = cancellable(
            cancel,
            sqlx::query_as::<_, StandbySubscription>(
                r#"
                SELECT subname::text AS subname, subenabled
                FROM pg_subscription
                ORDER BY subname
                "#,
            )
            .fetch_all(&mut conn),
        )
        .await??;

        close(conn).await;
        Ok(ReplicationData { active, standby })
    }

    async fn run_ddl(&self, instance: &Instance, ddl: &str, cancel: &CancellationToken) -> Result<()> {
        let mut conn = self.sql.connect(instance, cancel).await?;
        cancellable(cancel, sqlx::raw_sql(ddl).execute(&mut conn))
            .await?
            .map_err(|source| Error::ReplicationSetup {
                instance: instance.name.clone(),
                source,
            })?;
        close(conn).await;
        Ok(())
    }
}

/// Close gracefully; a failed close only loses the goodbye message.
pub(crate) async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Closing SQL connection failed");
    }
}
