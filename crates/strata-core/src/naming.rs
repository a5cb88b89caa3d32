//! Schema naming and identifier validation.
//!
//! Physical schema identifiers are interpolated into DDL (parameterized
//! queries cannot carry identifiers), so every name passes through a strict
//! allow-listed validator before it reaches any SQL string. This module
//! prevents:
//! - Identifier injection into dynamically built DDL
//! - Malformed or over-long schema names
//! - Accidental routing to schemas outside the tenant namespace

use crate::{Result, StrataError};
use std::fmt;

/// Prefix shared by every tenant schema.
pub const TENANT_SCHEMA_PREFIX: &str = "tenant_";

/// The shared metadata schema.
pub const SHARED_SCHEMA: &str = "public";

/// Maximum length for derived slugs.
pub const MAX_SLUG_LEN: usize = 40;

/// Maximum length for schema names (PostgreSQL identifier limit).
pub const MAX_SCHEMA_NAME_LEN: usize = 63;

/// Derive a URL-safe slug from an organization name.
///
/// Lowercases the input and collapses every run of non-alphanumeric
/// characters into a single underscore, then truncates to [`MAX_SLUG_LEN`]
/// and trims leading/trailing underscores.
///
/// # Errors
///
/// Returns `StrataError::Validation` if nothing alphanumeric survives.
pub fn slugify(name: &str) -> Result<String> {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_matches('_').to_string();

    if slug.is_empty() {
        return Err(StrataError::Validation(format!(
            "organization name {:?} contains no usable characters",
            name
        )));
    }

    Ok(slug)
}

/// A validated physical schema identifier.
///
/// Either a tenant schema (`tenant_<slug>_<suffix>`) or the literal shared
/// schema. Construction always validates, so holding a `SchemaName` is proof
/// the identifier is safe to interpolate into DDL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    /// Derive a fresh tenant schema name from a slug.
    ///
    /// Appends an opaque 8-hex-digit suffix so that two tenants with the
    /// same organization name never collide on the schema namespace.
    pub fn derive(slug: &str) -> Result<Self> {
        let suffix: u32 = rand::random();
        let name = format!("{}{}_{:08x}", TENANT_SCHEMA_PREFIX, slug, suffix);
        Self::parse(&name)
    }

    /// Validate an existing schema identifier.
    ///
    /// Accepts the literal shared schema, or a tenant schema matching
    /// `tenant_[a-z0-9_]+` within the identifier length limit. Everything
    /// else is rejected; this runs before any DDL interpolation.
    pub fn parse(name: &str) -> Result<Self> {
        if name == SHARED_SCHEMA {
            return Ok(Self(name.to_string()));
        }

        if name.len() > MAX_SCHEMA_NAME_LEN {
            return Err(StrataError::Validation(format!(
                "schema name too long: {} > {} characters",
                name.len(),
                MAX_SCHEMA_NAME_LEN
            )));
        }

        let body = name.strip_prefix(TENANT_SCHEMA_PREFIX).ok_or_else(|| {
            StrataError::Validation(format!(
                "schema name {:?} does not match the tenant pattern",
                name
            ))
        })?;

        if body.is_empty()
            || !body
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(StrataError::Validation(format!(
                "schema name {:?} contains invalid characters (allowed: a-z, 0-9, _)",
                name
            )));
        }

        Ok(Self(name.to_string()))
    }

    /// The shared metadata schema.
    pub fn shared() -> Self {
        Self(SHARED_SCHEMA.to_string())
    }

    /// Whether this is the shared metadata schema.
    pub fn is_shared(&self) -> bool {
        self.0 == SHARED_SCHEMA
    }

    /// Whether this is a tenant schema.
    pub fn is_tenant(&self) -> bool {
        !self.is_shared()
    }

    /// Get the schema identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SchemaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
