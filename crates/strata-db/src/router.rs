//! Query routing between the shared metadata schema and tenant schemas.
//!
//! The router is the single code path through which data-accessing
//! collaborators reach the database. For tenant operations it resolves the
//! schema from the ambient [`RequestContext`] and applies two
//! transaction-local settings in one place:
//!
//! - `search_path` = `<tenant schema>, public` (schema routing)
//! - `app.current_tenant` = tenant id (feeds the row-security policies)
//!
//! Both are set with `set_config(..., is_local := true)`, so they revert
//! automatically when the transaction ends. Connections are drawn from a
//! shared pool and reused across unrelated operations; a session-wide
//! setting would leak one tenant's routing to the next borrower of the same
//! connection, which is why an unscoped `SET` never appears here.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;
use strata_core::{current_context, RequestContext, Result, SchemaName, StrataError};
use tracing::{instrument, warn};
use uuid::Uuid;

/// Threshold above which a database operation is logged as slow.
const SLOW_OP_MS: u128 = 100;

/// A bindable value for the string entry points.
///
/// Callers of [`QueryRouter::execute_shared`] and
/// [`QueryRouter::execute_tenant`] pass values through this enum rather than
/// interpolating them into the SQL text.
#[derive(Debug, Clone)]
pub enum SqlParam {
    Text(String),
    Uuid(Uuid),
    BigInt(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Null,
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Uuid(v) => query.bind(*v),
            SqlParam::BigInt(v) => query.bind(*v),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Timestamp(v) => query.bind(*v),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

/// Routes units of work to the shared schema or the current tenant schema.
#[derive(Clone)]
pub struct QueryRouter {
    pool: PgPool,
}

impl QueryRouter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a unit of work against the shared metadata schema only.
    ///
    /// No tenant settings are applied; unqualified references resolve to
    /// the shared schema. Commits on success, rolls back on error.
    #[instrument(skip(self, f), fields(db.system = "postgresql", db.schema = "shared"))]
    pub async fn shared<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Run a unit of work scoped to the current tenant.
    ///
    /// Resolves the schema from the ambient request context; fails with
    /// `ContextMissing` when no context is established. The closure receives
    /// a transaction handle bound to one connection, so multiple statements
    /// observe a consistent, stable schema resolution.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let ctx = current_context()?;
        self.transaction_as(&ctx, f).await
    }

    /// Run a unit of work under an explicitly supplied context.
    ///
    /// Used by out-of-band callers (provisioning, migration sweep, health
    /// checks) that construct system contexts rather than inheriting an
    /// ambient one. System-role contexts additionally set the privileged
    /// bypass flag so internal operations can cross row-security policies;
    /// the policies themselves remain the second guarantee for every
    /// ordinary operation.
    #[instrument(
        skip(self, ctx, f),
        fields(
            db.system = "postgresql",
            tenant_id = %ctx.tenant_id,
            schema = %ctx.schema_name,
            request_id = %ctx.request_id
        )
    )]
    pub async fn transaction_as<F, T>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        if ctx.schema_name.is_shared() {
            return Err(StrataError::Validation(
                "tenant operation routed to the shared schema".to_string(),
            ));
        }

        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        apply_tenant_settings(&mut tx, ctx).await?;

        let result = match f(&mut tx).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        };

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_OP_MS {
            warn!(
                tenant_id = %ctx.tenant_id,
                schema = %ctx.schema_name,
                duration_ms = elapsed.as_millis(),
                "Slow database operation detected"
            );
        }

        result
    }

    /// Execute a single statement against the shared metadata schema.
    pub async fn execute_shared(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.shared(move |tx| {
            Box::pin(async move {
                let result = bind_params(sqlx::query(&sql), &params)
                    .execute(&mut **tx)
                    .await?;
                Ok(result.rows_affected())
            })
        })
        .await
    }

    /// Execute a single statement under the current tenant's context.
    pub async fn execute_tenant(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.transaction(move |tx| {
            Box::pin(async move {
                let result = bind_params(sqlx::query(&sql), &params)
                    .execute(&mut **tx)
                    .await?;
                Ok(result.rows_affected())
            })
        })
        .await
    }
}

/// Apply the tenant scoping settings to a fresh transaction.
///
/// `set_config` with `is_local = true` gives the settings transaction-local
/// scope; they revert when the transaction commits or rolls back, so the
/// connection returns to the pool clean.
pub(crate) async fn apply_tenant_settings(
    tx: &mut Transaction<'_, Postgres>,
    ctx: &RequestContext,
) -> Result<()> {
    let search_path = format!("{}, {}", ctx.schema_name.as_str(), SchemaName::shared());
    sqlx::query("SELECT set_config('search_path', $1, true)")
        .bind(&search_path)
        .execute(&mut **tx)
        .await?;

    sqlx::query("SELECT set_config('app.current_tenant', $1, true)")
        .bind(ctx.tenant_id.to_string())
        .execute(&mut **tx)
        .await?;

    if ctx.role.is_system() {
        sqlx::query("SELECT set_config('app.bypass_tenant_policy', 'on', true)")
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}
