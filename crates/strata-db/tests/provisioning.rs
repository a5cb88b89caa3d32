//! End-to-end provisioning, including the compensation path.
//!
//! Requires `STRATA_TEST_DATABASE_URL`; skipped otherwise.

mod common;

use strata_db::migrations::Migration;
use strata_db::{registry, tenants, ProvisionRequest, Provisioner, StrataError};
use uuid::Uuid;

fn request(user_id: Uuid, org: &str) -> ProvisionRequest {
    ProvisionRequest {
        user_id,
        plan_slug: "free".to_string(),
        org_name: org.to_string(),
        secret_ciphertext: None,
    }
}

#[tokio::test]
async fn test_provision_creates_metadata_schema_and_ledger() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user_id = common::create_user(&pool).await;
    let org = common::unique_org("Acme Rocket Skates");

    let provisioner = Provisioner::new(pool.clone());
    let outcome = provisioner.provision(request(user_id, &org)).await.unwrap();

    // Metadata row, active, pointing at the derived schema.
    let tenant = tenants::get_tenant(&pool, outcome.tenant_id)
        .await
        .unwrap()
        .expect("tenant row");
    assert_eq!(tenant.slug, outcome.slug);
    assert_eq!(tenant.schema_name, outcome.schema_name.as_str());
    assert_eq!(tenant.status, "active");
    assert_eq!(tenant.owner_id, Some(user_id));

    // Trial subscription opened in the same transaction.
    let sub = tenants::get_subscription(&pool, outcome.tenant_id)
        .await
        .unwrap()
        .expect("subscription row");
    assert_eq!(sub.status, "trial");
    assert!(sub.trial_ends_at.is_some());

    // Physical schema exists and is fully migrated.
    assert!(registry::schema_exists(&pool, &outcome.schema_name)
        .await
        .unwrap());
    let ledger = strata_db::migrations::ledger(&pool, &outcome.schema_name)
        .await
        .unwrap();
    assert_eq!(ledger.len(), strata_db::all_migrations().len());

    // Requesting user became the tenant admin.
    let (role, tenant_id): (String, Option<Uuid>) =
        sqlx::query_as("SELECT role, tenant_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(role, "admin");
    assert_eq!(tenant_id, Some(outcome.tenant_id));

    common::cleanup_tenant(&pool, outcome.tenant_id, &outcome.schema_name).await;
}

#[tokio::test]
async fn test_unknown_plan_is_rejected_before_any_mutation() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user_id = common::create_user(&pool).await;
    let org = common::unique_org("No Such Plan Inc");

    let provisioner = Provisioner::new(pool.clone());
    let err = provisioner
        .provision(ProvisionRequest {
            plan_slug: "platinum-unobtainium".to_string(),
            ..request(user_id, &org)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::PlanNotFound(_)));

    // Phase 1 rolled back: no tenant row, user untouched.
    let slug = strata_core::slugify(&org).unwrap();
    assert!(tenants::get_tenant_by_slug(&pool, &slug)
        .await
        .unwrap()
        .is_none());
    let (tenant_id,): (Option<Uuid>,) =
        sqlx::query_as("SELECT tenant_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(tenant_id.is_none());
}

#[tokio::test]
async fn test_duplicate_slug_is_rejected() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let first_user = common::create_user(&pool).await;
    let second_user = common::create_user(&pool).await;
    let org = common::unique_org("Twin Peaks Coffee");

    let provisioner = Provisioner::new(pool.clone());
    let outcome = provisioner
        .provision(request(first_user, &org))
        .await
        .unwrap();

    let err = provisioner
        .provision(request(second_user, &org))
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Validation(_)));

    common::cleanup_tenant(&pool, outcome.tenant_id, &outcome.schema_name).await;
}

// Second script always fails, forcing the compensation path.
static FAULTY_SET: [Migration; 2] = [
    Migration {
        name: "t0001_customers",
        up: "CREATE TABLE customers (id BIGSERIAL PRIMARY KEY, tenant_id UUID NOT NULL)",
        down: "DROP TABLE IF EXISTS customers",
    },
    Migration {
        name: "t0002_always_fails",
        up: "SELECT 1 / 0",
        down: "SELECT 1",
    },
];

#[tokio::test]
async fn test_failed_migrations_are_fully_compensated() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user_id = common::create_user(&pool).await;
    let org = common::unique_org("Doomed Ventures");

    // The user already holds a role; compensation must restore it rather
    // than reset to the default.
    sqlx::query("UPDATE users SET role = 'manager' WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let provisioner = Provisioner::with_migration_set(pool.clone(), &FAULTY_SET);
    let err = provisioner
        .provision(request(user_id, &org))
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::MigrationScriptFailure { .. }));

    // Compensation clawed everything back: no tenant row, no schema, user
    // unattached and holding the role it had before the admin grant.
    let slug = strata_core::slugify(&org).unwrap();
    assert!(tenants::get_tenant_by_slug(&pool, &slug)
        .await
        .unwrap()
        .is_none());
    let (role, tenant_id): (String, Option<Uuid>) =
        sqlx::query_as("SELECT role, tenant_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(role, "manager");
    assert!(tenant_id.is_none());

    let schemas = registry::list_tenant_schemas(&pool).await.unwrap();
    assert!(
        !schemas.iter().any(|s| s.as_str().contains("doomed_ventures")),
        "orphaned schema left behind after compensation"
    );
}

#[tokio::test]
async fn test_suspend_and_reactivate_round_trip() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user_id = common::create_user(&pool).await;
    let org = common::unique_org("Pausable Corp");

    let provisioner = Provisioner::new(pool.clone());
    let outcome = provisioner.provision(request(user_id, &org)).await.unwrap();

    tenants::suspend_tenant(&pool, outcome.tenant_id, Some(user_id))
        .await
        .unwrap();
    let tenant = tenants::get_tenant(&pool, outcome.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tenant.status, "suspended");
    assert!(!tenant.is_operational());

    tenants::reactivate_tenant(&pool, outcome.tenant_id, Some(user_id))
        .await
        .unwrap();
    let tenant = tenants::get_tenant(&pool, outcome.tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert!(tenant.is_operational());

    common::cleanup_tenant(&pool, outcome.tenant_id, &outcome.schema_name).await;
}
