//! Authentication error taxonomy and `WWW-Authenticate` header construction.
//!
//! Every failure in the verification pipeline maps to exactly one variant of
//! [`AuthError`], and each variant maps to a fixed HTTP status code and a
//! stable external message. Internal detail (which claim failed, which key id
//! was requested) stays in the error's `Display` output for logging and never
//! reaches the response body.

use std::fmt;

/// Box error alias used in tower service bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The claim that caused a [`AuthError::ClaimRejected`] failure.
///
/// Carried for internal logging only; external responses never name the
/// failing claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    /// The `iss` claim was missing or did not match the configured issuer.
    Issuer,
    /// The `aud` claim was missing or did not contain the configured audience.
    Audience,
    /// The `exp` claim was missing or not in the future.
    Expiration,
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimKind::Issuer => write!(f, "iss"),
            ClaimKind::Audience => write!(f, "aud"),
            ClaimKind::Expiration => write!(f, "exp"),
        }
    }
}

/// Authentication/authorization failure.
///
/// Variants other than [`InsufficientScope`](AuthError::InsufficientScope)
/// are authentication failures and map to HTTP 401; `InsufficientScope` is an
/// authorization failure and maps to HTTP 403.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header was absent or not `Bearer <token>`.
    /// Rejected before any network I/O.
    #[error("authorization header missing or malformed")]
    Unauthenticated,

    /// The token's compact structure or header segment could not be parsed,
    /// or the header carried no key id.
    #[error("token structure is not parsable")]
    Malformed,

    /// The signing key could not be resolved (unknown key id, or the key set
    /// fetch failed). The distinction is logged where the resolver error is
    /// first observed and deliberately collapsed here.
    #[error("no usable signing key for token")]
    KeyUnavailable,

    /// The signature did not verify under the resolved key and the
    /// server-configured algorithm, or the token declared a different
    /// algorithm than the server is configured for.
    #[error("token signature rejected")]
    BadSignature,

    /// A required claim was missing or did not match configuration.
    #[error("token claim rejected: {0}")]
    ClaimRejected(ClaimKind),

    /// The token validated but does not carry the required scope(s).
    #[error("insufficient scope: required [{}]", .required.join(", "))]
    InsufficientScope {
        /// Scopes required by the operation.
        required: Vec<String>,
        /// Scopes granted by the token.
        provided: Vec<String>,
    },
}

impl AuthError {
    /// HTTP status code for this failure.
    ///
    /// 401 for authentication failures, 403 for insufficient scope.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InsufficientScope { .. } => 403,
            _ => 401,
        }
    }

    /// Stable, non-leaking message for the external response body.
    ///
    /// Deliberately coarse: callers outside the trust boundary learn whether
    /// they failed authentication or authorization, nothing more.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "missing or malformed authorization header",
            AuthError::InsufficientScope { .. } => "insufficient scope for this resource",
            _ => "invalid access token",
        }
    }

    /// Builds the `WWW-Authenticate` header value per RFC 6750 Section 3.
    pub fn www_authenticate(&self) -> String {
        match self {
            // RFC 6750 Section 3: when the request carried no credentials the
            // resource server SHOULD NOT include an error code.
            AuthError::Unauthenticated => "Bearer".to_string(),
            AuthError::InsufficientScope { required, .. } => {
                if required.is_empty() {
                    "Bearer error=\"insufficient_scope\"".to_string()
                } else {
                    format!(
                        "Bearer error=\"insufficient_scope\", scope=\"{}\"",
                        required.join(" ")
                    )
                }
            }
            _ => "Bearer error=\"invalid_token\"".to_string(),
        }
    }
}

/// Error constructing a [`JwksVerifier`](crate::JwksVerifier).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No expected audience was configured.
    #[error("an expected audience is required")]
    MissingAudience,

    /// The configured algorithm is outside the RSA family this verifier
    /// resolves keys for.
    #[error("unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::Unauthenticated.status_code(), 401);
        assert_eq!(AuthError::Malformed.status_code(), 401);
        assert_eq!(AuthError::KeyUnavailable.status_code(), 401);
        assert_eq!(AuthError::BadSignature.status_code(), 401);
        assert_eq!(AuthError::ClaimRejected(ClaimKind::Issuer).status_code(), 401);
        assert_eq!(
            AuthError::InsufficientScope {
                required: vec![],
                provided: vec![]
            }
            .status_code(),
            403
        );
    }

    #[test]
    fn test_public_message_does_not_name_claim() {
        for kind in [ClaimKind::Issuer, ClaimKind::Audience, ClaimKind::Expiration] {
            let msg = AuthError::ClaimRejected(kind).public_message();
            assert!(!msg.contains("iss"));
            assert!(!msg.contains("aud"));
            assert!(!msg.contains("exp"));
        }
    }

    #[test]
    fn test_www_authenticate_missing_credentials() {
        assert_eq!(AuthError::Unauthenticated.www_authenticate(), "Bearer");
    }

    #[test]
    fn test_www_authenticate_invalid_token() {
        let header = AuthError::BadSignature.www_authenticate();
        assert!(header.contains("error=\"invalid_token\""));
        // No description that could aid an attacker
        assert!(!header.contains("error_description"));
    }

    #[test]
    fn test_www_authenticate_insufficient_scope() {
        let err = AuthError::InsufficientScope {
            required: vec!["read:courses".to_string()],
            provided: vec!["read:profile".to_string()],
        };
        let header = err.www_authenticate();
        assert!(header.contains("error=\"insufficient_scope\""));
        assert!(header.contains("scope=\"read:courses\""));
        // Granted scopes stay internal
        assert!(!header.contains("read:profile"));
    }

    #[test]
    fn test_display_names_claim_for_logging() {
        let err = AuthError::ClaimRejected(ClaimKind::Audience);
        assert_eq!(err.to_string(), "token claim rejected: aud");
    }
}
