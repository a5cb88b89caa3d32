//! Strata DB
//!
//! PostgreSQL layer for the Strata multi-tenant store. Every tenant's
//! business data lives in its own database schema; this crate owns the
//! machinery that keeps those schemas isolated and consistent:
//!
//! ```text
//! RequestContext ──▶ QueryRouter ──▶ search_path + app.current_tenant
//!        │                                  │ (transaction-local)
//!        │                                  ▼
//!        │                         Row-security policies
//!        │                         (second, independent guard)
//!        ▼
//! Provisioner ──▶ metadata tx + CREATE SCHEMA ──▶ MigrationRunner
//!                        │ (phase 1)                  │ (phase 2)
//!                        └──── compensation on phase-2 failure
//! ```
//!
//! Isolation is defense-in-depth: the router scopes every statement to the
//! tenant's schema, and the database re-checks tenant identity at the row
//! level through policies installed by the migration set. Either mechanism
//! alone is sufficient to keep cross-tenant rows unreachable.

pub mod audit;
pub mod migrations;
pub mod models;
pub mod policy;
pub mod pool;
pub mod provision;
pub mod registry;
pub mod router;
pub mod schema;
pub mod tenants;

pub use migrations::{all_migrations, Migration, MigrationReport, SweepReport};
pub use models::{Subscription, SubscriptionPlan, Tenant, TenantStatus};
pub use pool::{connect, PoolConfig};
pub use provision::{Provisioned, ProvisionRequest, Provisioner};
pub use router::{QueryRouter, SqlParam};

pub use strata_core::{Result, StrataError};
