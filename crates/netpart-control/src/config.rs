// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for netpart-control.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Port PostgreSQL listens on inside every instance container.
pub const SQL_PORT: u16 = 5432;

/// Image used when the caller does not name one.
pub const DEFAULT_IMAGE: &str = "postgres:16.3-alpine3.20";

/// Credentials and address used to reach instance SQL endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSettings {
    /// Host on which published instance ports are reachable.
    pub host: String,
    /// Superuser name configured inside every instance.
    pub user: String,
    /// Superuser password configured inside every instance.
    pub password: String,
    /// Database created inside every instance.
    pub database: String,
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "main".to_string(),
        }
    }
}

/// Control plane configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container runtime CLI binary
    pub docker_bin: String,
    /// Runtime endpoint passed to the CLI as DOCKER_HOST (None keeps the CLI default)
    pub docker_host: Option<String>,
    /// Image used by `create_instance` when none is given
    pub default_image: String,
    /// SQL endpoint settings
    pub sql: SqlSettings,
    /// Backoff policy for SQL connects and runtime pings
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            docker_host: None,
            default_image: DEFAULT_IMAGE.to_string(),
            sql: SqlSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let docker_bin = std::env::var("NETPART_DOCKER_BIN").unwrap_or(defaults.docker_bin);
        let docker_host = std::env::var("DOCKER_HOST").ok().filter(|h| !h.is_empty());
        let default_image = std::env::var("POSTGRES_IMAGE")
            .ok()
            .filter(|i| !i.is_empty())
            .unwrap_or(defaults.default_image);

        let sql = SqlSettings {
            host: std::env::var("NETPART_SQL_HOST").unwrap_or(defaults.sql.host),
            user: std::env::var("NETPART_SQL_USER").unwrap_or(defaults.sql.user),
            password: std::env::var("NETPART_SQL_PASSWORD").unwrap_or(defaults.sql.password),
            database: std::env::var("NETPART_SQL_DATABASE").unwrap_or(defaults.sql.database),
        };

        let retry = RetryPolicy {
            initial_delay: parse_millis("NETPART_RETRY_INITIAL_MS", defaults.retry.initial_delay)?,
            max_delay: parse_millis("NETPART_RETRY_MAX_MS", defaults.retry.max_delay)?,
            deadline: parse_millis("NETPART_CONNECT_TIMEOUT_MS", defaults.retry.deadline)?,
        };

        if retry.initial_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "NETPART_RETRY_INITIAL_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            docker_bin,
            docker_host,
            default_image,
            sql,
            retry,
        })
    }

    /// Set the runtime CLI binary.
    pub fn with_docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }

    /// Set the default image.
    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    /// Set the SQL endpoint settings.
    pub fn with_sql(mut self, sql: SqlSettings) -> Self {
        self.sql = sql;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_millis(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.docker_bin, "docker");
        assert_eq!(config.default_image, DEFAULT_IMAGE);
        assert_eq!(config.sql.database, "main");
        assert_eq!(config.sql.user, "postgres");
        assert!(config.docker_host.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::default()
            .with_docker_bin("podman")
            .with_default_image("postgres:17")
            .with_retry(RetryPolicy {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(50),
                deadline: Duration::from_secs(1),
            });

        assert_eq!(config.docker_bin, "podman");
        assert_eq!(config.default_image, "postgres:17");
        assert_eq!(config.retry.max_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_parse_millis_default_when_unset() {
        let parsed = parse_millis("NETPART_TEST_UNSET_VARIABLE", Duration::from_millis(42)).unwrap();
        assert_eq!(parsed, Duration::from_millis(42));
    }
}
