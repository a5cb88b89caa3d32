//! Migration 0001: core tenant business tables.
//!
//! Creates the per-tenant customer and invoice tables. Every tenant-owned
//! table carries a `tenant_id` column: schema routing already isolates the
//! tables themselves, and the column is what the row-security policies
//! (installed by 0002) compare against.

use super::Migration;

pub const MIGRATION: Migration = Migration {
    name: "0001_tenant_tables",
    up: UP,
    down: DOWN,
};

const UP: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  tenant_id UUID NOT NULL,
  name TEXT NOT NULL,
  email TEXT,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS invoices (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  tenant_id UUID NOT NULL,
  customer_id UUID REFERENCES customers(id),
  number TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'draft',
  amount_cents BIGINT NOT NULL DEFAULT 0,
  currency TEXT NOT NULL DEFAULT 'USD',
  issued_at TIMESTAMPTZ,
  due_at TIMESTAMPTZ,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

const DOWN: &str = r#"
DROP TABLE IF EXISTS invoices;
DROP TABLE IF EXISTS customers;
"#;
