//! Migration 0002: row-security policies on tenant-owned tables.
//!
//! Installs the database-resident isolation layer: a row is visible or
//! writable only under a privileged system operation, or when its
//! `tenant_id` matches the transaction-scoped `app.current_tenant` setting.
//! The setting is read without the missing-ok flag, so querying a protected
//! table with no tenant context raises an error: no context, no rows.
//!
//! Table references are unqualified; the runner puts the target schema on
//! the search path. The predicate must stay in sync with
//! [`crate::policy::TENANT_POLICY_PREDICATE`].

use super::Migration;

pub const MIGRATION: Migration = Migration {
    name: "0002_row_security",
    up: UP,
    down: DOWN,
};

const UP: &str = r#"
ALTER TABLE customers ENABLE ROW LEVEL SECURITY;
ALTER TABLE customers FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON customers;
CREATE POLICY tenant_isolation ON customers
    USING (current_setting('app.bypass_tenant_policy', true) = 'on'
           OR tenant_id = current_setting('app.current_tenant')::uuid)
    WITH CHECK (current_setting('app.bypass_tenant_policy', true) = 'on'
           OR tenant_id = current_setting('app.current_tenant')::uuid);

ALTER TABLE invoices ENABLE ROW LEVEL SECURITY;
ALTER TABLE invoices FORCE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON invoices;
CREATE POLICY tenant_isolation ON invoices
    USING (current_setting('app.bypass_tenant_policy', true) = 'on'
           OR tenant_id = current_setting('app.current_tenant')::uuid)
    WITH CHECK (current_setting('app.bypass_tenant_policy', true) = 'on'
           OR tenant_id = current_setting('app.current_tenant')::uuid);
"#;

const DOWN: &str = r#"
DROP POLICY IF EXISTS tenant_isolation ON invoices;
ALTER TABLE invoices DISABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS tenant_isolation ON customers;
ALTER TABLE customers DISABLE ROW LEVEL SECURITY;
"#;
