//! Connection pool configuration and setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use strata_core::{Result, StrataError};
use tracing::instrument;

/// Configuration for the PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
    pub max_lifetime_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            idle_timeout_secs: None,
            max_lifetime_secs: None,
        }
    }
}

/// Connect to PostgreSQL with the default pool configuration.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    connect_with(database_url, PoolConfig::default()).await
}

/// Connect to PostgreSQL with a custom pool configuration.
pub async fn connect_with(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    if config.min_connections == 0 {
        return Err(StrataError::Validation(
            "min_connections must be > 0".to_string(),
        ));
    }
    if config.max_connections == 0 || config.max_connections < config.min_connections {
        return Err(StrataError::Validation(
            "max_connections must be >= min_connections and > 0".to_string(),
        ));
    }

    let mut opts = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs));

    if let Some(idle) = config.idle_timeout_secs {
        opts = opts.idle_timeout(std::time::Duration::from_secs(idle));
    }
    if let Some(max_life) = config.max_lifetime_secs {
        opts = opts.max_lifetime(std::time::Duration::from_secs(max_life));
    }

    let pool = opts.connect(database_url).await?;
    Ok(pool)
}

/// Health check for readiness probes.
#[instrument(skip(pool))]
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
        .map_err(StrataError::from)
}
