//! Migration 0003: indexes for common billing lookups.

use super::Migration;

pub const MIGRATION: Migration = Migration {
    name: "0003_billing_indexes",
    up: UP,
    down: DOWN,
};

const UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_customers_tenant ON customers(tenant_id);
CREATE INDEX IF NOT EXISTS idx_invoices_tenant ON invoices(tenant_id);
CREATE INDEX IF NOT EXISTS idx_invoices_customer ON invoices(customer_id);
CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_invoices_number ON invoices(tenant_id, number);
"#;

const DOWN: &str = r#"
DROP INDEX IF EXISTS idx_invoices_number;
DROP INDEX IF EXISTS idx_invoices_status;
DROP INDEX IF EXISTS idx_invoices_customer;
DROP INDEX IF EXISTS idx_invoices_tenant;
DROP INDEX IF EXISTS idx_customers_tenant;
"#;
