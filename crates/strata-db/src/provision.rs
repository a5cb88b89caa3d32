//! Tenant provisioning with compensating cleanup.
//!
//! Provisioning is deliberately two-phase:
//!
//! - **Phase 1** runs in a single transaction: plan lookup, tenant and
//!   subscription rows, `CREATE SCHEMA`, owner linkage, audit entry. If any
//!   step fails the transaction rolls back and the schema is never left
//!   half-created relative to the metadata.
//! - **Phase 2** runs the migration set against the new schema *outside*
//!   that transaction, since the schema must already be committed and
//!   visible to the fresh connections the runner draws from the pool.
//!
//! Phase-2 failure triggers compensating actions issued as independent
//! statements: revert the owner linkage, delete the tenant row, drop the
//! schema. If compensation itself fails partway, an orphaned schema or
//! dangling metadata can result; that condition is logged as fatal and
//! surfaced as `CompensationFailure`, never silently swallowed.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use strata_core::{slugify, Result, SchemaName, StrataError};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{self, AuditRecord};
use crate::migrations::{self, Migration};
use crate::models::SubscriptionPlan;

/// Length of the trial window opened for every new tenant.
const TRIAL_DAYS: i64 = 14;

/// Request to provision a new tenant.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Requesting user; becomes the tenant owner with the admin role.
    pub user_id: Uuid,
    /// Slug of the plan the tenant signs up for.
    pub plan_slug: String,
    /// Desired organization name; the slug and schema name derive from it.
    pub org_name: String,
    /// Envelope-encrypted tenant key material, produced by the external
    /// key-management collaborator. Opaque here.
    pub secret_ciphertext: Option<String>,
}

/// Successful provisioning outcome.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub tenant_id: Uuid,
    pub schema_name: SchemaName,
    pub slug: String,
}

/// Orchestrates tenant creation end to end.
pub struct Provisioner {
    pool: PgPool,
    migration_set: &'static [Migration],
}

impl Provisioner {
    /// Create a provisioner using the standard migration set.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            migration_set: migrations::all_migrations(),
        }
    }

    /// Create a provisioner with an explicit migration set.
    ///
    /// This is how tests force a failing script to exercise the
    /// compensation path.
    pub fn with_migration_set(pool: PgPool, migration_set: &'static [Migration]) -> Self {
        Self {
            pool,
            migration_set,
        }
    }

    /// Provision a new tenant.
    ///
    /// On return the end state is exactly one of {fully provisioned, fully
    /// absent}, unless compensation itself failed, which surfaces as
    /// `CompensationFailure` and requires operator intervention.
    #[instrument(skip(self, req), fields(user_id = %req.user_id, plan = %req.plan_slug))]
    pub async fn provision(&self, req: ProvisionRequest) -> Result<Provisioned> {
        let slug = slugify(&req.org_name)?;
        let schema_name = SchemaName::derive(&slug)?;
        let tenant_id = Uuid::new_v4();

        let prior_role = self.phase_one(&req, tenant_id, &slug, &schema_name).await?;

        info!(
            tenant_id = %tenant_id,
            schema = %schema_name,
            "Phase 1 committed, running migrations"
        );

        // Phase 2: outside the phase-1 transaction.
        let outcome = migrations::apply(&self.pool, &schema_name, self.migration_set).await;
        let failure = match outcome {
            Ok(report) if report.ok() => {
                info!(
                    tenant_id = %tenant_id,
                    schema = %schema_name,
                    executed = report.executed.len(),
                    "Tenant provisioned"
                );
                return Ok(Provisioned {
                    tenant_id,
                    schema_name,
                    slug,
                });
            }
            Ok(report) => report.errors.join("; "),
            Err(e) => e.to_string(),
        };

        warn!(
            tenant_id = %tenant_id,
            schema = %schema_name,
            error = %failure,
            "Migrations failed, compensating"
        );
        self.compensate(req.user_id, &prior_role, tenant_id, &schema_name)
            .await?;

        Err(StrataError::MigrationScriptFailure {
            schema: schema_name.as_str().to_string(),
            message: failure,
        })
    }

    /// Phase 1: metadata rows, physical schema, and owner linkage in one
    /// transaction. Returns the role the requesting user held before the
    /// admin grant, so compensation can restore it.
    async fn phase_one(
        &self,
        req: &ProvisionRequest,
        tenant_id: Uuid,
        slug: &str,
        schema_name: &SchemaName,
    ) -> Result<String> {
        let mut tx = self.pool.begin().await?;

        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, slug, name, max_members, max_invoices_per_month, features, created_at
            FROM subscription_plans
            WHERE slug = $1
            "#,
        )
        .bind(&req.plan_slug)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StrataError::PlanNotFound(req.plan_slug.clone()))?;

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, slug, schema_name, status, owner_id, secret_ciphertext)
            VALUES ($1, $2, $3, $4, 'active', $5, $6)
            "#,
        )
        .bind(tenant_id)
        .bind(&req.org_name)
        .bind(slug)
        .bind(schema_name.as_str())
        .bind(req.user_id)
        .bind(&req.secret_ciphertext)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, slug))?;

        let now = Utc::now();
        let trial_end = now + Duration::days(TRIAL_DAYS);
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (tenant_id, plan_id, status, current_period_start, current_period_end, trial_ends_at)
            VALUES ($1, $2, 'trial', $3, $4, $4)
            "#,
        )
        .bind(tenant_id)
        .bind(plan.id)
        .bind(now)
        .bind(trial_end)
        .execute(&mut *tx)
        .await?;

        // Identifier validated at construction; DDL cannot carry bind
        // parameters.
        let create = format!(r#"CREATE SCHEMA "{}""#, schema_name.as_str());
        sqlx::raw_sql(&create)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_schema_collision(e, schema_name))?;

        // Lock the user row and remember its role before the admin grant.
        let prior_role: (String,) =
            sqlx::query_as("SELECT role FROM users WHERE id = $1 FOR UPDATE")
                .bind(req.user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    StrataError::Validation(format!(
                        "requesting user {} does not exist",
                        req.user_id
                    ))
                })?;

        sqlx::query(
            "UPDATE users SET tenant_id = $1, role = 'admin', updated_at = now() WHERE id = $2",
        )
        .bind(tenant_id)
        .bind(req.user_id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            AuditRecord {
                action: "tenant.provisioned",
                tenant_id: Some(tenant_id),
                actor: Some(req.user_id),
                details: Some(serde_json::json!({
                    "plan": plan.slug,
                    "schema": schema_name.as_str(),
                })),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(prior_role.0)
    }

    /// Compensating actions after a phase-2 failure.
    ///
    /// Issued as independent statements, not one transaction with phase 1:
    /// at this point the metadata is already committed and the goal is to
    /// claw back as much as possible. Every failure is collected so the
    /// operator sees the full extent of any inconsistency.
    async fn compensate(
        &self,
        user_id: Uuid,
        prior_role: &str,
        tenant_id: Uuid,
        schema_name: &SchemaName,
    ) -> Result<()> {
        let mut failures: Vec<String> = Vec::new();

        if let Err(e) = sqlx::query(
            "UPDATE users SET tenant_id = NULL, role = $1, updated_at = now() WHERE id = $2",
        )
        .bind(prior_role)
        .bind(user_id)
        .execute(&self.pool)
        .await
        {
            failures.push(format!("revert user linkage: {}", e));
        }

        // Subscription rows follow via ON DELETE CASCADE.
        if let Err(e) = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await
        {
            failures.push(format!("delete tenant row: {}", e));
        }

        let drop_schema = format!(
            r#"DROP SCHEMA IF EXISTS "{}" CASCADE"#,
            schema_name.as_str()
        );
        if let Err(e) = sqlx::raw_sql(&drop_schema).execute(&self.pool).await {
            failures.push(format!("drop schema: {}", e));
        }

        if failures.is_empty() {
            warn!(
                tenant_id = %tenant_id,
                schema = %schema_name,
                "Provisioning rolled back cleanly"
            );
            if let Err(e) = audit::record(
                &self.pool,
                AuditRecord {
                    action: "tenant.provision_rolled_back",
                    tenant_id: Some(tenant_id),
                    actor: Some(user_id),
                    details: None,
                },
            )
            .await
            {
                warn!(tenant_id = %tenant_id, error = %e, "Failed to audit rollback");
            }
            return Ok(());
        }

        let detail = failures.join("; ");
        error!(
            tenant_id = %tenant_id,
            schema = %schema_name,
            failures = %detail,
            "FATAL: compensation failed, metadata and physical schema may be inconsistent"
        );
        Err(StrataError::CompensationFailure(detail))
    }
}

/// Map a duplicate-schema DDL error to the typed collision error.
fn map_schema_collision(e: sqlx::Error, schema_name: &SchemaName) -> StrataError {
    if let Some(db_err) = e.as_database_error() {
        // 42P06: duplicate_schema
        if db_err.code().as_deref() == Some("42P06") {
            return StrataError::SchemaCollision(schema_name.as_str().to_string());
        }
    }
    StrataError::Database(e)
}

/// Map a tenants-row unique violation (slug or schema_name) to a caller
/// error the caller may retry with different input.
fn map_unique_violation(e: sqlx::Error, slug: &str) -> StrataError {
    if let Some(db_err) = e.as_database_error() {
        // 23505: unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return StrataError::Validation(format!(
                "organization slug {:?} is already in use",
                slug
            ));
        }
    }
    StrataError::Database(e)
}
