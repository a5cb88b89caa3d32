//! Role model and enforcement.
//!
//! Two distinct policies live here and are intentionally never unified into
//! a hierarchy:
//!
//! - **Strict equality** ([`allow`]/[`enforce`]) for operation-level
//!   requirements. A system role such as the migration runner is usable only
//!   for its own declared purpose; an administrative role does not satisfy a
//!   system-role requirement and vice versa.
//! - **Enumerated role sets** ([`Role::is_any_of`]) for user-facing
//!   endpoints that accept several ordinary tenant roles.

use crate::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A caller role carried by the request context.
///
/// Ordinary tenant roles originate from authenticated end users; the
/// `System*` family is reserved for internal privileged operations and never
/// originates from end-user input (see [`Role::parse_user_role`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative access within a tenant.
    Admin,
    /// Manages day-to-day tenant operations.
    Manager,
    /// Read-mostly reporting access.
    Analyst,
    /// Basic tenant member.
    Staff,
    /// Internal: schema migration runner.
    SystemMigration,
    /// Internal: background job worker.
    SystemJob,
    /// Internal: readonly health check probe.
    SystemHealthReadonly,
}

impl Role {
    /// Get the role as its canonical string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Analyst => "analyst",
            Role::Staff => "staff",
            Role::SystemMigration => "system_migration",
            Role::SystemJob => "system_job",
            Role::SystemHealthReadonly => "system_health_readonly",
        }
    }

    /// Whether this is an internal system role.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Role::SystemMigration | Role::SystemJob | Role::SystemHealthReadonly
        )
    }

    /// Membership test against an enumerated set of roles.
    ///
    /// This is the policy used by user-facing endpoints that accept several
    /// ordinary roles; it performs no hierarchy expansion.
    pub fn is_any_of(&self, roles: &[Role]) -> bool {
        roles.contains(self)
    }

    /// Parse a role from end-user input.
    ///
    /// System roles are rejected here regardless of spelling; they can only
    /// be constructed internally.
    pub fn parse_user_role(s: &str) -> Result<Self> {
        let role: Role = s.parse()?;
        if role.is_system() {
            return Err(StrataError::Validation(format!(
                "role {:?} is not assignable to users",
                s
            )));
        }
        Ok(role)
    }
}

impl std::str::FromStr for Role {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "analyst" => Ok(Role::Analyst),
            "staff" => Ok(Role::Staff),
            "system_migration" => Ok(Role::SystemMigration),
            "system_job" => Ok(Role::SystemJob),
            "system_health_readonly" => Ok(Role::SystemHealthReadonly),
            _ => Err(StrataError::Validation(format!("unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strict-equality role check.
///
/// - `required = None` means the operation declares no restriction: allowed.
/// - A restriction with no actual role (no context) is always a denial,
///   never a silent allow.
/// - Otherwise the roles must be exactly equal; there is no hierarchy.
pub fn allow(required: Option<Role>, actual: Option<Role>) -> bool {
    match required {
        None => true,
        Some(req) => actual.map(|a| a == req).unwrap_or(false),
    }
}

/// Enforce a strict role requirement, logging denials for audit.
pub fn enforce(required: Option<Role>, actual: Option<Role>) -> Result<()> {
    if allow(required, actual) {
        return Ok(());
    }

    let required_str = required.map(|r| r.as_str()).unwrap_or("none");
    let actual_str = actual.map(|r| r.as_str()).unwrap_or("none");

    tracing::warn!(
        required = required_str,
        actual = actual_str,
        "Role violation denied"
    );

    match actual {
        None => Err(StrataError::ContextMissing),
        Some(_) => Err(StrataError::RoleViolation {
            required: required_str.to_string(),
            actual: actual_str.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_strict_equality() {
        assert!(allow(Some(Role::SystemMigration), Some(Role::SystemMigration)));
        assert!(!allow(Some(Role::SystemMigration), Some(Role::SystemJob)));
        assert!(!allow(Some(Role::SystemMigration), Some(Role::Admin)));
        assert!(!allow(Some(Role::Admin), Some(Role::SystemMigration)));
        assert!(!allow(Some(Role::Admin), Some(Role::Manager)));
    }

    #[test]
    fn test_allow_no_restriction() {
        assert!(allow(None, Some(Role::Staff)));
        assert!(allow(None, Some(Role::SystemJob)));
        assert!(allow(None, None));
    }

    #[test]
    fn test_allow_missing_context_is_denial() {
        assert!(!allow(Some(Role::Admin), None));
        assert!(!allow(Some(Role::SystemHealthReadonly), None));
    }

    #[test]
    fn test_enforce_error_kinds() {
        assert!(enforce(Some(Role::Admin), Some(Role::Admin)).is_ok());
        assert!(matches!(
            enforce(Some(Role::Admin), None),
            Err(StrataError::ContextMissing)
        ));
        assert!(matches!(
            enforce(Some(Role::SystemMigration), Some(Role::SystemJob)),
            Err(StrataError::RoleViolation { .. })
        ));
    }

    #[test]
    fn test_is_any_of() {
        assert!(Role::Manager.is_any_of(&[Role::Admin, Role::Manager]));
        assert!(!Role::Staff.is_any_of(&[Role::Admin, Role::Manager]));
        // No hierarchy: admin is not implicitly in a set it is absent from
        assert!(!Role::Admin.is_any_of(&[Role::Manager, Role::Analyst]));
    }

    #[test]
    fn test_parse_user_role_rejects_system() {
        assert!(Role::parse_user_role("admin").is_ok());
        assert!(Role::parse_user_role("STAFF").is_ok());
        assert!(Role::parse_user_role("system_migration").is_err());
        assert!(Role::parse_user_role("system_job").is_err());
        assert!(Role::parse_user_role("nonsense").is_err());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [
            Role::Admin,
            Role::Manager,
            Role::Analyst,
            Role::Staff,
            Role::SystemMigration,
            Role::SystemJob,
            Role::SystemHealthReadonly,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }
}
