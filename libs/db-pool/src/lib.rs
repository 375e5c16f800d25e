//! Database connection pool management
//!
//! Builds and verifies the deadpool-postgres pool used by the chat relay and
//! applies its schema migrations.

mod metrics;

pub use deadpool_postgres::PoolError;
pub use metrics::acquire_with_metrics;
use metrics::update_pool_metrics;

use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime, Timeouts};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection creation timeout (new connection to PostgreSQL)
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidUrl(#[source] tokio_postgres::Error),

    #[error("failed to build pool: {0}")]
    Build(String),

    #[error("connection failed: {0}")]
    Connect(#[from] PoolError),

    #[error("connection verification timed out after {0}s")]
    Timeout(u64),

    #[error("migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    ///
    /// Returns `None` when `DATABASE_URL` is not set.
    pub fn from_env(service_name: &str) -> Option<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())?;
        let defaults = Self::default();

        Some(Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        })
    }

    /// Log pool configuration details
    pub fn log_config(&self) {
        info!(
            "Database Pool Configuration: max_connections={}, connect_timeout={}s, acquire_timeout={}s",
            self.max_connections, self.connect_timeout_secs, self.acquire_timeout_secs
        );
    }
}

pub type PgPool = Pool;

/// Build a deadpool-postgres pool and verify it with `SELECT 1`
pub async fn create_pool(config: &DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        "Creating database pool: service={}, max={}, acquire_timeout={}s",
        config.service_name, config.max_connections, config.acquire_timeout_secs
    );

    let pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(DbPoolError::InvalidUrl)?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .runtime(Runtime::Tokio1)
        .timeouts(Timeouts {
            wait: Some(Duration::from_secs(config.acquire_timeout_secs)),
            create: Some(Duration::from_secs(config.connect_timeout_secs)),
            recycle: None,
        })
        .build()
        .map_err(|e| DbPoolError::Build(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(PoolError::Backend)?;
        Ok::<(), PoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );

            update_pool_metrics(&pool, &config.service_name);
            {
                let pool_clone = pool.clone();
                let service = config.service_name.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(30));
                    loop {
                        interval.tick().await;
                        update_pool_metrics(&pool_clone, &service);
                    }
                });
            }

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(DbPoolError::Connect(e))
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(DbPoolError::Timeout(config.connect_timeout_secs))
        }
    }
}

/// Apply `(name, sql)` migrations in order. Each script must be idempotent
/// (`CREATE ... IF NOT EXISTS`); there is no applied-migrations ledger.
pub async fn migrate(pool: &PgPool, migrations: &[(&str, &str)]) -> Result<(), DbPoolError> {
    let client = pool.get().await?;
    for (name, sql) in migrations {
        client
            .batch_execute(sql)
            .await
            .map_err(|source| DbPoolError::Migration {
                name: name.to_string(),
                source,
            })?;
        info!(migration = %name, "migration applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "DB_MAX_CONNECTIONS",
            "DB_CONNECT_TIMEOUT_SECS",
            "DB_ACQUIRE_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_requires_database_url() {
        clear_env();
        assert!(DbConfig::from_env("chat-relay-service").is_none());

        std::env::set_var("DATABASE_URL", "  ");
        assert!(DbConfig::from_env("chat-relay-service").is_none());
        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_defaults_and_overrides() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/chat");

        let config = DbConfig::from_env("chat-relay-service").unwrap();
        assert_eq!(config.service_name, "chat-relay-service");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.connect_timeout_secs, 5);

        std::env::set_var("DB_MAX_CONNECTIONS", "32");
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "not-a-number");
        let config = DbConfig::from_env("chat-relay-service").unwrap();
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.acquire_timeout_secs, 10);

        clear_env();
    }

    #[tokio::test]
    async fn test_create_pool_rejects_malformed_url() {
        let config = DbConfig {
            database_url: "postgres://user@host:notaport/db".to_string(),
            ..DbConfig::default()
        };
        assert!(matches!(
            create_pool(&config).await,
            Err(DbPoolError::InvalidUrl(_))
        ));
    }
}
