//! Audit logging for control operations.

use sqlx::PgExecutor;
use strata_core::{current_context, Result};
use uuid::Uuid;

/// One audit record. The request id is taken from the ambient context when
/// present; out-of-band callers (CLI, startup sweep) simply have none.
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub action: &'a str,
    pub tenant_id: Option<Uuid>,
    pub actor: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

/// Write an audit entry.
///
/// Takes any executor so callers can audit inside the transaction whose
/// effects they are recording.
pub async fn record<'e, E>(executor: E, rec: AuditRecord<'_>) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let request_id = current_context().ok().map(|ctx| ctx.request_id);

    sqlx::query(
        r#"
        INSERT INTO audit_log (action, tenant_id, actor, details, request_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(rec.action)
    .bind(rec.tenant_id)
    .bind(rec.actor)
    .bind(rec.details)
    .bind(request_id)
    .execute(executor)
    .await?;

    Ok(())
}
