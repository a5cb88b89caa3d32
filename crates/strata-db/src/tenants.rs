//! Tenant metadata queries and lifecycle transitions.
//!
//! Everything here runs against the shared `public` schema and never enters
//! a tenant schema; tenant-scoped access goes through the query router.

use sqlx::PgPool;
use strata_core::{Result, StrataError};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit::{self, AuditRecord};
use crate::models::{Subscription, SubscriptionPlan, Tenant, TenantStatus};

/// Fetch a tenant by id.
pub async fn get_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Option<Tenant>> {
    let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;
    Ok(tenant)
}

/// Fetch a tenant by slug.
pub async fn get_tenant_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Tenant>> {
    let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(tenant)
}

/// List all registered tenants, newest first.
pub async fn list_tenants(pool: &PgPool) -> Result<Vec<Tenant>> {
    let tenants = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(tenants)
}

/// Fetch the subscription attached to a tenant, if any.
pub async fn get_subscription(pool: &PgPool, tenant_id: Uuid) -> Result<Option<Subscription>> {
    let sub = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;
    Ok(sub)
}

/// Fetch a subscription plan by slug.
pub async fn get_plan_by_slug(pool: &PgPool, slug: &str) -> Result<SubscriptionPlan> {
    sqlx::query_as::<_, SubscriptionPlan>("SELECT * FROM subscription_plans WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StrataError::PlanNotFound(slug.to_string()))
}

/// List the seeded plan catalog.
pub async fn list_plans(pool: &PgPool) -> Result<Vec<SubscriptionPlan>> {
    let plans =
        sqlx::query_as::<_, SubscriptionPlan>("SELECT * FROM subscription_plans ORDER BY slug")
            .fetch_all(pool)
            .await?;
    Ok(plans)
}

/// Suspend a tenant. Suspended tenants keep their schema and data but are
/// refused by request-context construction at the application edge.
pub async fn suspend_tenant(pool: &PgPool, tenant_id: Uuid, actor: Option<Uuid>) -> Result<()> {
    set_tenant_status(pool, tenant_id, TenantStatus::Suspended, actor).await
}

/// Reactivate a suspended tenant.
pub async fn reactivate_tenant(pool: &PgPool, tenant_id: Uuid, actor: Option<Uuid>) -> Result<()> {
    set_tenant_status(pool, tenant_id, TenantStatus::Active, actor).await
}

#[instrument(skip(pool))]
async fn set_tenant_status(
    pool: &PgPool,
    tenant_id: Uuid,
    status: TenantStatus,
    actor: Option<Uuid>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let updated =
        sqlx::query("UPDATE tenants SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
    if updated.rows_affected() == 0 {
        return Err(StrataError::Validation(format!(
            "tenant {} does not exist",
            tenant_id
        )));
    }

    audit::record(
        &mut *tx,
        AuditRecord {
            action: match status {
                TenantStatus::Active => "tenant.reactivated",
                TenantStatus::Suspended => "tenant.suspended",
                TenantStatus::Cancelled => "tenant.cancelled",
            },
            tenant_id: Some(tenant_id),
            actor,
            details: None,
        },
    )
    .await?;

    tx.commit().await?;
    info!(tenant_id = %tenant_id, status = status.as_str(), "Tenant status updated");
    Ok(())
}
