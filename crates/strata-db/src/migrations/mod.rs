//! Per-schema migration framework.
//!
//! Tenant schemas are evolved by a statically registered, explicitly
//! ordered set of named scripts (no runtime directory scanning). Execution
//! is tracked in a `migrations` ledger table living *inside each tenant
//! schema*, so each schema records its own progress independently.
//!
//! # Design Principles
//!
//! 1. **Idempotent**: a schema whose ledger already holds every script is a
//!    no-op re-run (all skipped, zero mutations)
//! 2. **Ordered**: scripts execute strictly in name order; each commits
//!    before the next begins
//! 3. **Atomic per script**: one transaction per script; a script either
//!    fully commits or fully rolls back
//! 4. **Fail-stop per schema**: a failing script aborts the remaining
//!    scripts for that schema (later scripts may assume earlier state), but
//!    never aborts sibling schemas in a sweep
//! 5. **Validated targets**: schema names pass the strict identifier
//!    validator before any DDL interpolation
//! 6. **Exclusive per schema**: an advisory lock keyed on the schema name
//!    serializes concurrent runners (startup sweep vs. provisioning), and
//!    the ledger is re-checked under the lock before a script runs

use sqlx::PgPool;
use std::collections::HashSet;
use strata_core::{Result, SchemaName, StrataError};
use tracing::{error, info, instrument, warn};

use crate::models::LedgerEntry;
use crate::registry;

mod m0001_tenant_tables;
mod m0002_row_security;
mod m0003_billing_indexes;

/// One schema-mutation script.
///
/// `up` runs with the target schema alone on the search path, so its table
/// references stay unqualified. `down` exists for manual rollback by an
/// operator and is never invoked automatically.
pub struct Migration {
    /// Unique name; the set is ordered lexicographically by it.
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// The full migration set, in execution order.
pub fn all_migrations() -> &'static [Migration] {
    &[
        m0001_tenant_tables::MIGRATION,
        m0002_row_security::MIGRATION,
        m0003_billing_indexes::MIGRATION,
    ]
}

/// Outcome of applying a migration set to one schema.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

impl MigrationReport {
    /// Whether every script is now recorded in the ledger.
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregate outcome of a batch sweep across tenant schemas.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Verify the set is in strict lexicographic order with unique names.
fn validate_set(set: &[Migration]) -> Result<()> {
    for pair in set.windows(2) {
        if pair[0].name >= pair[1].name {
            return Err(StrataError::Validation(format!(
                "migration set out of order: {:?} must precede {:?}",
                pair[0].name, pair[1].name
            )));
        }
    }
    Ok(())
}

/// Serialize migration runners touching the same schema.
///
/// Transaction-scoped advisory lock keyed on the schema name; released
/// automatically at commit or rollback, so a crashed runner can never leave
/// a stale lock behind.
async fn lock_schema(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schema: &SchemaName,
) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('strata_migrations'), hashtext($1))")
        .bind(schema.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Ensure the per-schema ledger table exists. Idempotent; serialized under
/// the schema lock so concurrent runners cannot race the DDL.
async fn ensure_ledger(pool: &PgPool, schema: &SchemaName) -> Result<()> {
    let mut tx = pool.begin().await?;
    lock_schema(&mut tx, schema).await?;
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{}".migrations (
            id BIGSERIAL PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            ts TIMESTAMPTZ NOT NULL DEFAULT now(),
            executed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        schema.as_str()
    );
    sqlx::raw_sql(&ddl).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Names already recorded in a schema's ledger.
async fn applied_names(pool: &PgPool, schema: &SchemaName) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(&format!(
        r#"SELECT name FROM "{}".migrations"#,
        schema.as_str()
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Apply a migration set to one schema.
///
/// Scripts already present in the ledger are skipped. Each pending script
/// runs in its own transaction: search path scoped to the target schema,
/// `up` executed, ledger row inserted, commit. On failure the transaction
/// rolls back, the error is recorded, and the remaining scripts for this
/// schema are aborted.
#[instrument(skip(pool, set), fields(db.system = "postgresql", schema = %schema))]
pub async fn apply(
    pool: &PgPool,
    schema: &SchemaName,
    set: &[Migration],
) -> Result<MigrationReport> {
    // Re-validate even though SchemaName construction already did: this is
    // the last stop before identifier interpolation.
    let schema = SchemaName::parse(schema.as_str())?;
    validate_set(set)?;

    ensure_ledger(pool, &schema).await?;
    let applied = applied_names(pool, &schema).await?;

    let mut report = MigrationReport::default();

    for migration in set {
        if applied.contains(migration.name) {
            report.skipped.push(migration.name.to_string());
            continue;
        }

        info!(schema = %schema, name = migration.name, "Applying migration");

        let result = async {
            let mut tx = pool.begin().await?;

            // Serialize against concurrent runners (sweep vs. provisioning)
            // before touching the ledger or the schema.
            lock_schema(&mut tx, &schema).await?;

            // Transaction-local: only the target schema on the path, so the
            // script's unqualified DDL lands where it must.
            sqlx::query("SELECT set_config('search_path', $1, true)")
                .bind(schema.as_str())
                .execute(&mut *tx)
                .await?;

            // The runner is a privileged system operation.
            sqlx::query("SELECT set_config('app.bypass_tenant_policy', 'on', true)")
                .execute(&mut *tx)
                .await?;

            // Re-check under the lock: a concurrent runner may have applied
            // this script between our ledger read and acquiring the lock.
            let (already,): (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM migrations WHERE name = $1)")
                    .bind(migration.name)
                    .fetch_one(&mut *tx)
                    .await?;
            if already {
                tx.rollback().await?;
                return Ok::<_, StrataError>(false);
            }

            sqlx::raw_sql(migration.up).execute(&mut *tx).await?;

            sqlx::query("INSERT INTO migrations (name) VALUES ($1)")
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(true) => {
                info!(schema = %schema, name = migration.name, "Migration applied");
                report.executed.push(migration.name.to_string());
            }
            Ok(false) => {
                info!(
                    schema = %schema,
                    name = migration.name,
                    "Migration applied by a concurrent runner, skipping"
                );
                report.skipped.push(migration.name.to_string());
            }
            Err(e) => {
                // Transaction dropped on the error path rolls back; nothing
                // of this script persists.
                error!(
                    schema = %schema,
                    name = migration.name,
                    error = %e,
                    "Migration failed, aborting remaining scripts for this schema"
                );
                report
                    .errors
                    .push(format!("{}: {}", migration.name, e));
                break;
            }
        }
    }

    Ok(report)
}

/// Apply the migration set across every live tenant schema.
///
/// One schema's failure is recorded and the sweep continues with the next
/// schema; no ordering across schemas is guaranteed or required.
#[instrument(skip(pool, set), fields(db.system = "postgresql"))]
pub async fn apply_all(pool: &PgPool, set: &[Migration]) -> Result<SweepReport> {
    let schemas = registry::list_tenant_schemas(pool).await?;
    let mut report = SweepReport {
        total: schemas.len(),
        ..Default::default()
    };

    for schema in &schemas {
        match apply(pool, schema, set).await {
            Ok(r) if r.ok() => report.succeeded += 1,
            Ok(r) => {
                warn!(schema = %schema, errors = ?r.errors, "Schema failed during sweep");
                report.failed += 1;
            }
            Err(e) => {
                warn!(schema = %schema, error = %e, "Schema failed during sweep");
                report.failed += 1;
            }
        }
    }

    info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        "Migration sweep complete"
    );
    Ok(report)
}

/// Applied entries from a schema's ledger, in name order.
pub async fn ledger(pool: &PgPool, schema: &SchemaName) -> Result<Vec<LedgerEntry>> {
    let schema = SchemaName::parse(schema.as_str())?;
    ensure_ledger(pool, &schema).await?;
    let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
        r#"SELECT id, name, ts, executed_at FROM "{}".migrations ORDER BY name"#,
        schema.as_str()
    ))
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Names of scripts not yet applied to a schema.
pub async fn pending(
    pool: &PgPool,
    schema: &SchemaName,
    set: &[Migration],
) -> Result<Vec<&'static str>> {
    let applied = {
        ensure_ledger(pool, schema).await?;
        applied_names(pool, schema).await?
    };
    Ok(set
        .iter()
        .filter(|m| !applied.contains(m.name))
        .map(|m| m.name)
        .collect())
}
