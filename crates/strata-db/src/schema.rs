//! Shared metadata schema for the Strata store.
//!
//! All cross-tenant metadata lives in the shared/public schema: tenants,
//! subscriptions, the immutable plan catalog, user-to-tenant linkage, and
//! the audit log. Tenant business tables never appear here; they live in
//! the per-tenant schemas managed by [`crate::migrations`].

use sqlx::PgPool;
use strata_core::Result;
use tracing::info;

/// DDL for the shared metadata tables. Idempotent.
const METADATA_DDL: &str = r#"
-- Immutable plan catalog (read-only to this core)
CREATE TABLE IF NOT EXISTS subscription_plans (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  slug TEXT UNIQUE NOT NULL,
  name TEXT NOT NULL,
  max_members BIGINT NOT NULL,
  max_invoices_per_month BIGINT NOT NULL,
  features JSONB NOT NULL DEFAULT '{}'::jsonb,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- User accounts (authentication itself is an external collaborator;
-- this core only maintains the tenant linkage and role columns)
CREATE TABLE IF NOT EXISTS users (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  email TEXT UNIQUE NOT NULL,
  role TEXT NOT NULL DEFAULT 'staff',
  tenant_id UUID,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_users_tenant ON users(tenant_id);

-- Tenant registry
CREATE TABLE IF NOT EXISTS tenants (
  id UUID PRIMARY KEY,
  name TEXT NOT NULL,
  slug TEXT UNIQUE NOT NULL,
  schema_name TEXT UNIQUE NOT NULL,
  status TEXT NOT NULL DEFAULT 'active',
  owner_id UUID REFERENCES users(id),
  secret_ciphertext TEXT,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
  updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- One subscription per tenant, created in the provisioning transaction
CREATE TABLE IF NOT EXISTS subscriptions (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  tenant_id UUID UNIQUE NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
  plan_id UUID NOT NULL REFERENCES subscription_plans(id),
  status TEXT NOT NULL DEFAULT 'trial',
  current_period_start TIMESTAMPTZ NOT NULL,
  current_period_end TIMESTAMPTZ NOT NULL,
  trial_ends_at TIMESTAMPTZ,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- Audit log for control operations
CREATE TABLE IF NOT EXISTS audit_log (
  id BIGSERIAL PRIMARY KEY,
  ts TIMESTAMPTZ NOT NULL DEFAULT now(),
  action TEXT NOT NULL,
  tenant_id UUID,
  actor UUID,
  details JSONB,
  request_id UUID
);

CREATE INDEX IF NOT EXISTS idx_audit_log_tenant ON audit_log(tenant_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_ts ON audit_log(ts);

-- Seed the plan catalog
INSERT INTO subscription_plans (slug, name, max_members, max_invoices_per_month, features)
VALUES
  ('free',    'Free',    3,  50,    '{"exports": false}'),
  ('starter', 'Starter', 10, 500,   '{"exports": true}'),
  ('growth',  'Growth',  50, 10000, '{"exports": true, "api_access": true}')
ON CONFLICT (slug) DO NOTHING;
"#;

/// Initialize the shared metadata schema.
///
/// Creates all metadata tables if they don't exist and seeds the plan
/// catalog. Safe to run at every startup.
pub async fn init_metadata_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(METADATA_DDL).execute(pool).await?;
    info!("Initialized shared metadata schema");
    Ok(())
}
