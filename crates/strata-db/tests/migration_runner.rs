//! Migration runner behavior against a live database.
//!
//! Requires `STRATA_TEST_DATABASE_URL`; skipped otherwise.

mod common;

use strata_db::migrations::{self, Migration};

static HAPPY_SET: [Migration; 2] = [
    Migration {
        name: "t0001_widgets",
        up: "CREATE TABLE widgets (id BIGSERIAL PRIMARY KEY, label TEXT NOT NULL)",
        down: "DROP TABLE IF EXISTS widgets",
    },
    Migration {
        name: "t0002_widget_index",
        up: "CREATE INDEX idx_widgets_label ON widgets(label)",
        down: "DROP INDEX IF EXISTS idx_widgets_label",
    },
];

// Second script references a column that does not exist; third script is
// valid but must never run once the second has failed.
static FAULTY_SET: [Migration; 3] = [
    Migration {
        name: "t0001_widgets",
        up: "CREATE TABLE widgets (id BIGSERIAL PRIMARY KEY, label TEXT NOT NULL)",
        down: "DROP TABLE IF EXISTS widgets",
    },
    Migration {
        name: "t0002_broken",
        up: "CREATE INDEX idx_widgets_missing ON widgets(no_such_column)",
        down: "DROP INDEX IF EXISTS idx_widgets_missing",
    },
    Migration {
        name: "t0003_never_runs",
        up: "CREATE TABLE gadgets (id BIGSERIAL PRIMARY KEY)",
        down: "DROP TABLE IF EXISTS gadgets",
    },
];

#[tokio::test]
async fn test_apply_then_reapply_is_idempotent() {
    let _guard = common::serial().await;
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let schema = common::create_bare_schema(&pool).await;

    let first = migrations::apply(&pool, &schema, &HAPPY_SET).await.unwrap();
    assert!(first.ok());
    assert_eq!(first.executed, vec!["t0001_widgets", "t0002_widget_index"]);
    assert!(first.skipped.is_empty());

    // Replay: zero executions, zero mutations.
    let second = migrations::apply(&pool, &schema, &HAPPY_SET).await.unwrap();
    assert!(second.ok());
    assert!(second.executed.is_empty());
    assert_eq!(second.skipped.len(), 2);

    let ledger = migrations::ledger(&pool, &schema).await.unwrap();
    assert_eq!(ledger.len(), 2);

    common::drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_failing_script_stops_schema_and_keeps_partial_ledger() {
    let _guard = common::serial().await;
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let schema = common::create_bare_schema(&pool).await;

    let report = migrations::apply(&pool, &schema, &FAULTY_SET).await.unwrap();
    assert!(!report.ok());
    // First script committed before the failure.
    assert_eq!(report.executed, vec!["t0001_widgets"]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("t0002_broken"));

    // Fail-stop: the third script was never attempted.
    let ledger = migrations::ledger(&pool, &schema).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].name, "t0001_widgets");

    let pending = migrations::pending(&pool, &schema, &FAULTY_SET).await.unwrap();
    assert_eq!(pending, vec!["t0002_broken", "t0003_never_runs"]);

    common::drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_failed_script_leaves_no_partial_objects() {
    let _guard = common::serial().await;
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let schema = common::create_bare_schema(&pool).await;

    // A script whose first statement succeeds and second fails must leave
    // neither behind.
    static PARTIAL: [Migration; 1] = [Migration {
        name: "t0001_two_statements",
        up: "CREATE TABLE half_done (id BIGSERIAL PRIMARY KEY);\n\
             CREATE INDEX idx_bad ON half_done(no_such_column);",
        down: "DROP TABLE IF EXISTS half_done",
    }];

    let report = migrations::apply(&pool, &schema, &PARTIAL).await.unwrap();
    assert!(!report.ok());

    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = $1 AND table_name = 'half_done')",
    )
    .bind(schema.as_str())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(!exists.0, "rolled-back script must leave no objects");

    common::drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_concurrent_runners_apply_each_script_exactly_once() {
    let _guard = common::serial().await;
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let schema = common::create_bare_schema(&pool).await;

    // A sweep and a provisioning run can target the same schema at the same
    // time; the schema lock must let one win per script and turn the other
    // into a skip, never a failure.
    let (a, b) = tokio::join!(
        migrations::apply(&pool, &schema, &HAPPY_SET),
        migrations::apply(&pool, &schema, &HAPPY_SET),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a.ok(), "first runner errored: {:?}", a.errors);
    assert!(b.ok(), "second runner errored: {:?}", b.errors);

    // Every script landed exactly once across both runners.
    assert_eq!(a.executed.len() + b.executed.len(), HAPPY_SET.len());
    let ledger = migrations::ledger(&pool, &schema).await.unwrap();
    assert_eq!(ledger.len(), HAPPY_SET.len());

    common::drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_sweep_continues_past_failing_schema() {
    let _guard = common::serial().await;
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let good = common::create_bare_schema(&pool).await;
    let bad = common::create_bare_schema(&pool).await;

    // Poison one schema: pre-create the table the first script creates, so
    // that script fails there and succeeds elsewhere.
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE "{}".widgets (clash INT)"#,
        bad.as_str()
    ))
    .execute(&pool)
    .await
    .unwrap();

    let report = migrations::apply_all(&pool, &HAPPY_SET).await.unwrap();
    // The database may hold schemas from earlier runs; assert on our two.
    assert!(report.total >= 2);
    assert!(report.failed >= 1);

    let good_ledger = migrations::ledger(&pool, &good).await.unwrap();
    assert_eq!(good_ledger.len(), 2, "healthy schema completed despite sibling failure");
    let bad_ledger = migrations::ledger(&pool, &bad).await.unwrap();
    assert!(bad_ledger.is_empty());

    common::drop_schema(&pool, &good).await;
    common::drop_schema(&pool, &bad).await;
}
