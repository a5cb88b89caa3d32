//! Strata Core
//!
//! Core types for the Strata multi-tenant relational store: the per-operation
//! request context, the role model, schema-name derivation and validation,
//! and the shared error taxonomy.
//!
//! This crate is deliberately free of connection-pool machinery; everything
//! here is usable by any layer that needs to reason about tenant identity
//! without touching the database.

pub mod context;
pub mod naming;
pub mod roles;

pub use context::{current_context, run_with_context, RequestContext};
pub use naming::{slugify, SchemaName};
pub use roles::{allow, enforce, Role};

/// Errors that can occur in tenancy operations.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    /// No request context was established for an operation that requires one.
    /// Always surfaced as access-denied to the caller, never auto-recovered.
    #[error("no request context established for this operation")]
    ContextMissing,

    /// The requested subscription plan does not exist.
    #[error("subscription plan not found: {0}")]
    PlanNotFound(String),

    /// Schema-name derivation produced a name that already exists.
    /// The caller may retry with different input.
    #[error("schema already exists: {0}")]
    SchemaCollision(String),

    /// One or more migration scripts failed for a schema. Remaining scripts
    /// for that schema were aborted; sibling schemas are unaffected.
    #[error("migration failed for schema {schema}: {message}")]
    MigrationScriptFailure { schema: String, message: String },

    /// Provisioning cleanup itself failed, leaving metadata and the physical
    /// schema potentially inconsistent. Always operator-visible.
    #[error("compensation failed, manual intervention required: {0}")]
    CompensationFailure(String),

    /// Strict role mismatch.
    #[error("role violation: required {required}, actual {actual}")]
    RoleViolation { required: String, actual: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("other error: {0}")]
    Other(String),
}

/// Result type for tenancy operations.
pub type Result<T> = std::result::Result<T, StrataError>;
