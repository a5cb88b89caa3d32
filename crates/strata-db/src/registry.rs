//! Read-only view over the live schema catalog.

use sqlx::PgPool;
use strata_core::{Result, SchemaName};
use tracing::warn;

/// List every tenant schema currently present in the database.
///
/// Names that no longer pass validation (manual intervention gone wrong)
/// are skipped with a warning rather than interpolated anywhere.
pub async fn list_tenant_schemas(pool: &PgPool) -> Result<Vec<SchemaName>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT schema_name
        FROM information_schema.schemata
        WHERE schema_name LIKE 'tenant\_%'
        ORDER BY schema_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut schemas = Vec::with_capacity(rows.len());
    for (name,) in rows {
        match SchemaName::parse(&name) {
            Ok(schema) => schemas.push(schema),
            Err(e) => warn!(schema = %name, error = %e, "Skipping unparseable schema name"),
        }
    }
    Ok(schemas)
}

/// Check whether a schema physically exists.
pub async fn schema_exists(pool: &PgPool, schema: &SchemaName) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
    )
    .bind(schema.as_str())
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
