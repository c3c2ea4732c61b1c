//! Scope requirements and per-path authorization policy.
//!
//! [`ScopeRequirement`] is the pure allow/deny decision: it reads granted
//! scopes from validated [`Claims`] and never performs I/O. [`ScopePolicy`]
//! maps request paths to requirements with a default fallback, so the set of
//! protected operations is declared up front rather than scattered across
//! handlers.

use std::collections::{HashMap, HashSet};

use crate::claims::Claims;
use crate::error::AuthError;

/// A set of required scopes for an operation.
///
/// All scopes in the requirement must be granted for access (AND semantics).
/// The common case is a single scope via [`ScopeRequirement::one`].
#[derive(Debug, Clone, Default)]
pub struct ScopeRequirement {
    required: HashSet<String>,
}

impl ScopeRequirement {
    /// Create an empty requirement (no scopes needed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a requirement from a single scope.
    pub fn one(scope: impl Into<String>) -> Self {
        let mut required = HashSet::new();
        required.insert(scope.into());
        Self { required }
    }

    /// Create a requirement from multiple scopes.
    pub fn all(scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a required scope.
    pub fn require(mut self, scope: impl Into<String>) -> Self {
        self.required.insert(scope.into());
        self
    }

    /// Check whether the given claims grant every required scope.
    ///
    /// A missing or empty scopes claim counts as zero granted scopes and
    /// denies any non-empty requirement.
    pub fn check(&self, claims: &Claims) -> Result<(), AuthError> {
        if self.required.is_empty() {
            return Ok(());
        }

        let provided = claims.scopes();
        if self.required.is_subset(&provided) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope {
                required: self.required.iter().cloned().collect(),
                provided: provided.into_iter().collect(),
            })
        }
    }

    /// The required scopes.
    pub fn required_scopes(&self) -> &HashSet<String> {
        &self.required
    }

    /// Returns true if no scopes are required.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }
}

/// Policy mapping request paths to required scopes.
///
/// Path entries match by prefix, so `/courses` covers `/courses/42` as well.
/// Path-specific requirements are checked *in addition* to the default.
///
/// # Example
///
/// ```rust
/// use tower_jwks_auth::ScopePolicy;
///
/// let policy = ScopePolicy::new()
///     .default_scope("api:access")
///     .path_scope("/courses", "read:courses")
///     .path_scope("/admin", "admin:all");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScopePolicy {
    default_scopes: ScopeRequirement,
    path_scopes: HashMap<String, ScopeRequirement>,
}

impl ScopePolicy {
    /// Create an empty policy (nothing beyond authentication required).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scope required for every request.
    pub fn default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scopes = self.default_scopes.require(scope);
        self
    }

    /// Replace the default requirement.
    pub fn default_scopes(mut self, requirement: ScopeRequirement) -> Self {
        self.default_scopes = requirement;
        self
    }

    /// Add a scope required for requests under a path prefix.
    pub fn path_scope(mut self, path: impl Into<String>, scope: impl Into<String>) -> Self {
        let entry = self.path_scopes.entry(path.into()).or_default();
        entry.required.insert(scope.into());
        self
    }

    /// Set the full requirement for a path prefix.
    pub fn path_scopes(
        mut self,
        path: impl Into<String>,
        requirement: ScopeRequirement,
    ) -> Self {
        self.path_scopes.insert(path.into(), requirement);
        self
    }

    /// Check whether the claims satisfy the policy for a request path.
    ///
    /// The default requirement is checked first, then every path entry whose
    /// prefix matches the request path.
    pub fn check(&self, path: &str, claims: &Claims) -> Result<(), AuthError> {
        self.default_scopes.check(claims)?;
        for (prefix, requirement) in &self.path_scopes {
            if path.starts_with(prefix.as_str()) {
                requirement.check(claims)?;
            }
        }
        Ok(())
    }
}
