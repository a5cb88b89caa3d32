//! Per-operation request context.
//!
//! Every logical operation (one inbound request or one background job step)
//! establishes exactly one [`RequestContext`] for the duration of its call
//! tree. The context is carried in a tokio task-local, scoped strictly to
//! the future passed to [`run_with_context`]: it is never a process-wide
//! singleton, cannot be mutated mid-operation, and vanishes when the
//! operation completes regardless of success. Concurrent operations each
//! observe their own independent context.

use crate::{Result, Role, SchemaName, StrataError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_CONTEXT: RequestContext;
}

/// Ambient record describing who is acting and against which tenant.
///
/// Immutable for the lifetime of one logical operation. All lower layers
/// (query router, role enforcement, audit) read it via [`current_context`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Tenant the operation acts on behalf of.
    pub tenant_id: Uuid,
    /// Acting user, or the synthetic system user for internal operations.
    pub user_id: Uuid,
    /// Caller role (ordinary tenant role or internal system role).
    pub role: Role,
    /// Validated physical schema for the tenant.
    pub schema_name: SchemaName,
    /// Correlation id for logs and audit entries.
    pub request_id: Uuid,
    /// When the operation was established.
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Create a context for an authenticated end-user operation.
    pub fn new(tenant_id: Uuid, user_id: Uuid, role: Role, schema_name: SchemaName) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
            schema_name,
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    /// Create a context for an internal privileged operation.
    ///
    /// System contexts are constructed by trusted code paths only; the role
    /// must be one of the `System*` roles.
    pub fn system(role: Role, tenant_id: Uuid, schema_name: SchemaName) -> Result<Self> {
        if !role.is_system() {
            return Err(StrataError::Validation(format!(
                "role {} is not a system role",
                role
            )));
        }
        Ok(Self {
            tenant_id,
            // Synthetic nil user: system operations have no acting end user.
            user_id: Uuid::nil(),
            role,
            schema_name,
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        })
    }

    /// Override the correlation id (propagated from an upstream caller).
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Run `fut` with `ctx` as the ambient context.
///
/// Any call to [`current_context`] inside `fut`, including in code invoked
/// transitively, observes `ctx`. The scope ends when the future completes.
pub async fn run_with_context<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CURRENT_CONTEXT.scope(ctx, fut).await
}

/// Resolve the ambient context for the current operation.
///
/// # Errors
///
/// Returns `StrataError::ContextMissing` when called outside a
/// [`run_with_context`] scope. Downstream components treat this as
/// access-denied; no operation touching tenant data proceeds without a
/// resolved context.
pub fn current_context() -> Result<RequestContext> {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| StrataError::ContextMissing)
}
