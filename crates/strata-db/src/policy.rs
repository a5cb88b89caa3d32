//! Row-security policy installation.
//!
//! Every tenant-owned table carries a database-resident policy comparing
//! its `tenant_id` column to the `app.current_tenant` session setting. The
//! setting is populated by [`crate::router`] with transaction-local scope,
//! through the same code path that sets the search path.
//!
//! The policy predicate reads `current_setting('app.current_tenant')`
//! WITHOUT the missing-ok flag: when no tenant context was applied, the
//! query on a protected table raises an explicit error instead of silently
//! returning every row. No context means no rows.
//!
//! This is an enforcement point independent of the query router: even if
//! schema selection misroutes a statement, the policy re-checks tenant
//! identity on every row.

use sqlx::{Postgres, Transaction};
use strata_core::{Result, SchemaName, StrataError};
use tracing::info;

/// Name under which the isolation policy is installed on each table.
pub const TENANT_POLICY_NAME: &str = "tenant_isolation";

/// Predicate shared by USING and WITH CHECK: a privileged system operation,
/// or a row owned by the current tenant.
pub const TENANT_POLICY_PREDICATE: &str = "current_setting('app.bypass_tenant_policy', true) = 'on' \
     OR tenant_id = current_setting('app.current_tenant')::uuid";

/// Validate a table identifier before DDL interpolation.
fn validate_table_name(table: &str) -> Result<()> {
    if table.is_empty()
        || !table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(StrataError::Validation(format!(
            "table name {:?} contains invalid characters (allowed: a-z, 0-9, _)",
            table
        )));
    }
    Ok(())
}

/// Build the row-security DDL for one tenant-owned table.
///
/// `FORCE ROW LEVEL SECURITY` keeps the policy effective even for the table
/// owner; only roles with BYPASSRLS (superusers) are outside its reach.
pub fn row_security_ddl(schema: &SchemaName, table: &str) -> Result<String> {
    validate_table_name(table)?;
    let qualified = format!("\"{}\".\"{}\"", schema.as_str(), table);
    Ok(format!(
        r#"
ALTER TABLE {qualified} ENABLE ROW LEVEL SECURITY;
ALTER TABLE {qualified} FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS {policy} ON {qualified};
CREATE POLICY {policy} ON {qualified}
    USING ({predicate})
    WITH CHECK ({predicate});
"#,
        qualified = qualified,
        policy = TENANT_POLICY_NAME,
        predicate = TENANT_POLICY_PREDICATE,
    ))
}

/// Install the isolation policy on a set of tenant-owned tables.
///
/// Used when tables are added outside the static migration set; the
/// standard migration scripts install the same policy via
/// [`crate::migrations`].
pub async fn install_tenant_policies(
    tx: &mut Transaction<'_, Postgres>,
    schema: &SchemaName,
    tables: &[&str],
) -> Result<()> {
    for table in tables {
        let ddl = row_security_ddl(schema, table)?;
        sqlx::raw_sql(&ddl).execute(&mut **tx).await?;
    }
    info!(schema = %schema, tables = tables.len(), "Installed row-security policies");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_contains_both_guards() {
        let schema = SchemaName::parse("tenant_acme_01234567").unwrap();
        let ddl = row_security_ddl(&schema, "invoices").unwrap();
        assert!(ddl.contains("ENABLE ROW LEVEL SECURITY"));
        assert!(ddl.contains("FORCE ROW LEVEL SECURITY"));
        assert!(ddl.contains("WITH CHECK"));
        // Missing-ok only on the bypass flag; the tenant read must raise
        // when unset.
        assert!(ddl.contains("current_setting('app.bypass_tenant_policy', true)"));
        assert!(ddl.contains("current_setting('app.current_tenant')::uuid"));
        assert!(!ddl.contains("current_setting('app.current_tenant', true)"));
    }

    #[test]
    fn test_rejects_bad_table_names() {
        let schema = SchemaName::parse("tenant_acme_01234567").unwrap();
        assert!(row_security_ddl(&schema, "invoices; DROP TABLE x").is_err());
        assert!(row_security_ddl(&schema, "Invoices").is_err());
        assert!(row_security_ddl(&schema, "").is_err());
        assert!(row_security_ddl(&schema, "in\"voices").is_err());
    }
}
