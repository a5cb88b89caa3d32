// Not every test binary uses every helper.
#![allow(dead_code)]

//! Shared harness for integration tests.
//!
//! These tests need a real PostgreSQL instance. Set
//! `STRATA_TEST_DATABASE_URL` to run them; without it every test returns
//! early as a skip, so the unit-test suite stays self-contained.

use sqlx::PgPool;
use std::sync::OnceLock;
use strata_core::SchemaName;
use strata_db::{pool, schema, PoolConfig};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const ENV_VAR: &str = "STRATA_TEST_DATABASE_URL";

static SERIAL: OnceLock<Mutex<()>> = OnceLock::new();

/// Serialize tests that observe database-wide state (schema sweeps,
/// connection reuse) so parallel tests in the same binary cannot interfere.
pub async fn serial() -> MutexGuard<'static, ()> {
    SERIAL.get_or_init(|| Mutex::new(())).lock().await
}

/// Connect to the test database, or `None` when the env var is unset.
pub async fn test_pool() -> Option<PgPool> {
    test_pool_with(PoolConfig::default()).await
}

pub async fn test_pool_with(config: PoolConfig) -> Option<PgPool> {
    let url = match std::env::var(ENV_VAR) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping: {} not set", ENV_VAR);
            return None;
        }
    };
    let pool = pool::connect_with(&url, config)
        .await
        .expect("test database must be reachable");
    schema::init_metadata_schema(&pool)
        .await
        .expect("metadata schema init");
    Some(pool)
}

/// Insert a fresh user row and return its id.
pub async fn create_user(pool: &PgPool) -> Uuid {
    let (id,): (Uuid,) =
        sqlx::query_as("INSERT INTO users (email) VALUES ($1) RETURNING id")
            .bind(format!("user-{}@test.invalid", Uuid::new_v4()))
            .fetch_one(pool)
            .await
            .expect("insert user");
    id
}

/// A unique organization name so slugs never collide across runs.
pub fn unique_org(prefix: &str) -> String {
    format!("{} {}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

/// Drop a tenant schema and its metadata rows. Best-effort teardown.
pub async fn cleanup_tenant(pool: &PgPool, tenant_id: Uuid, schema_name: &SchemaName) {
    let _ = sqlx::query("UPDATE users SET tenant_id = NULL WHERE tenant_id = $1")
        .bind(tenant_id)
        .execute(pool)
        .await;
    let _ = sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .execute(pool)
        .await;
    let _ = sqlx::raw_sql(&format!(
        r#"DROP SCHEMA IF EXISTS "{}" CASCADE"#,
        schema_name.as_str()
    ))
    .execute(pool)
    .await;
}

/// Create a bare schema (no tenant metadata) for migration-runner tests.
pub async fn create_bare_schema(pool: &PgPool) -> SchemaName {
    let schema = SchemaName::derive("runnertest").expect("derive schema name");
    sqlx::raw_sql(&format!(r#"CREATE SCHEMA "{}""#, schema.as_str()))
        .execute(pool)
        .await
        .expect("create schema");
    schema
}

pub async fn drop_schema(pool: &PgPool, schema: &SchemaName) {
    let _ = sqlx::raw_sql(&format!(
        r#"DROP SCHEMA IF EXISTS "{}" CASCADE"#,
        schema.as_str()
    ))
    .execute(pool)
    .await;
}
