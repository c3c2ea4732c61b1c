//! Validated token claims.
//!
//! [`Claims`] is the payload of a token **after** signature, issuer, audience
//! and expiry checks have passed. It is only ever constructed as the output of
//! [`VerifyToken::verify`](crate::VerifyToken::verify); there is no API that
//! decodes claims from an unverified token, so downstream code cannot read a
//! claim that was never verified.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Audience claim value, which can be a single string or array of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenAudience {
    /// A single audience string.
    Single(String),
    /// Multiple audience strings.
    Multiple(Vec<String>),
}

impl TokenAudience {
    /// Check if the audience contains a specific value.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            TokenAudience::Single(s) => s == value,
            TokenAudience::Multiple(v) => v.iter().any(|s| s == value),
        }
    }
}

/// Granted-scopes claim value.
///
/// Identity providers encode scopes either as a space-delimited string
/// (`"scope": "read:courses write:courses"`) or as a list
/// (`"scp": ["read:courses", "write:courses"]`). Both are accepted and
/// normalized by [`Claims::scopes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeClaim {
    /// Space-delimited scope string.
    Delimited(String),
    /// List of scope strings.
    List(Vec<String>),
}

/// Validated claims extracted from an access token.
///
/// Carries the claims this middleware depends on as named, typed fields, plus
/// an `extra` map for custom claims so nothing from the payload is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (this resource server or other identifiers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<TokenAudience>,

    /// Expiration time (Unix timestamp, seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Granted scopes, under either the `scope` or `scp` claim name.
    #[serde(default, alias = "scp", skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeClaim>,

    /// Additional claims not covered by the named fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Normalize the granted scopes into a set of individual scope strings.
    ///
    /// A missing or empty scopes claim yields an empty set, not an error.
    pub fn scopes(&self) -> HashSet<String> {
        match &self.scope {
            None => HashSet::new(),
            Some(ScopeClaim::Delimited(s)) => {
                s.split_whitespace().map(String::from).collect()
            }
            Some(ScopeClaim::List(v)) => v
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Check if the token grants a specific scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(scope)
    }
}
