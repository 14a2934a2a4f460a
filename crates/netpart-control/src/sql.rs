// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQL endpoint access for instances.
//!
//! Each operation opens its own connection to the instance's published port
//! and closes it afterwards. Connecting is retried with backoff because a
//! freshly started server refuses connections for a while.

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{SQL_PORT, SqlSettings};
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::retry::{RetryError, RetryPolicy, retry};

/// Connects to instance SQL endpoints.
#[derive(Debug, Clone)]
pub struct SqlEndpoint {
    settings: SqlSettings,
    retry: RetryPolicy,
}

impl SqlEndpoint {
    /// Create an endpoint factory.
    pub fn new(settings: SqlSettings, retry: RetryPolicy) -> Self {
        Self { settings, retry }
    }

    /// Connection options for the instance's host-side port.
    pub fn connect_options(&self, instance: &Instance) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.settings.host)
            .port(instance.port)
            .username(&self.settings.user)
            .password(&self.settings.password)
            .database(&self.settings.database)
    }

    /// Open a connection, retrying until the policy deadline or cancellation.
    pub async fn connect(
        &self,
        instance: &Instance,
        cancel: &CancellationToken,
    ) -> Result<PgConnection> {
        let options = self.connect_options(instance);
        let conn = retry(&self.retry, cancel, "sql connect", || options.connect())
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => Error::Cancelled,
                RetryError::Exhausted { attempts, last } => Error::SqlConnection {
                    instance: instance.name.clone(),
                    attempts,
                    message: last
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "connection attempt timed out".to_string()),
                },
            })?;
        debug!(instance = %instance.name, port = instance.port, "SQL connection established");
        Ok(conn)
    }

    /// libpq connection string a standby uses to reach `primary` over the
    /// instance networks, where the container name resolves as a host.
    pub fn peer_conninfo(&self, primary: &Instance) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            conninfo_value(&primary.name),
            SQL_PORT,
            conninfo_value(&self.settings.database),
            conninfo_value(&self.settings.user),
            conninfo_value(&self.settings.password),
        )
    }
}

/// Quote a value for a libpq `key=value` connection string.
fn conninfo_value(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Quote a value as a SQL string literal (standard conforming strings).
pub(crate) fn sql_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(port: u16) -> Instance {
        Instance {
            name: "netpart-db1".to_string(),
            container_id: "c".to_string(),
            network_id: "n".to_string(),
            port,
        }
    }

    #[test]
    fn test_peer_conninfo_uses_container_name() {
        let ep = SqlEndpoint::new(SqlSettings::default(), RetryPolicy::default());
        assert_eq!(
            ep.peer_conninfo(&inst(49153)),
            "host='netpart-db1' port=5432 dbname='main' user='postgres' password='postgres'"
        );
    }

    #[test]
    fn test_conninfo_and_literal_escaping() {
        assert_eq!(conninfo_value(r"it's\x"), r"'it\'s\\x'");
        assert_eq!(sql_literal("password='it''s'"), "'password=''it''''s'''");
    }

    #[test]
    fn test_connect_options_target_host_port() {
        let ep = SqlEndpoint::new(SqlSettings::default(), RetryPolicy::default());
        let opts = ep.connect_options(&inst(49153));
        assert_eq!(opts.get_port(), 49153);
        assert_eq!(opts.get_host(), "127.0.0.1");
        assert_eq!(opts.get_database(), Some("main"));
    }

    #[tokio::test]
    async fn test_connect_cancelled() {
        let ep = SqlEndpoint::new(SqlSettings::default(), RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ep.connect(&inst(1), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
