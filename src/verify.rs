//! Token verification against a remote JWK set.
//!
//! [`JwksVerifier`] is the standard implementation of the pluggable
//! [`VerifyToken`] trait: it resolves the signing key named by the token
//! header through a [`KeyResolver`](crate::KeyResolver), verifies the
//! signature under the **server-configured** algorithm, then checks issuer,
//! audience and expiry explicitly. A [`Claims`] value exists only as the
//! output of a fully successful verification.
//!
//! The configured algorithm is pinned: a token whose header declares any
//! other algorithm is rejected before signature verification is attempted,
//! so the token can never steer which verification behavior runs.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, Validation, decode, decode_header, errors::ErrorKind};

use crate::claims::Claims;
use crate::error::{AuthError, BuildError, ClaimKind};
use crate::jwks::{DEFAULT_JWKS_PATH, KeyResolver};

/// Trait for verifying bearer tokens.
///
/// Implement this to plug custom verification into
/// [`BearerAuthLayer`](crate::BearerAuthLayer) (e.g. token introspection, or
/// a static-key verifier in tests).
///
/// # Example
///
/// ```rust
/// use tower_jwks_auth::{VerifyToken, Claims, AuthError};
///
/// #[derive(Clone)]
/// struct DenyAll;
///
/// impl VerifyToken for DenyAll {
///     async fn verify(&self, _token: &str) -> Result<Claims, AuthError> {
///         Err(AuthError::BadSignature)
///     }
/// }
/// ```
pub trait VerifyToken: Clone + Send + Sync + 'static {
    /// Verify a raw token and return the validated claims.
    fn verify(&self, token: &str) -> impl Future<Output = Result<Claims, AuthError>> + Send;
}

pub(crate) struct VerifierConfig {
    pub issuer: String,
    pub audience: String,
    pub algorithm: Algorithm,
    pub leeway_secs: u64,
}

/// Verifies JWTs signed by keys published in a remote JWK set.
///
/// Cheap to clone; clones share the underlying key cache and HTTP client.
///
/// # Example
///
/// ```rust,no_run
/// use tower_jwks_auth::JwksVerifier;
///
/// # fn main() -> Result<(), tower_jwks_auth::BuildError> {
/// let verifier = JwksVerifier::builder("https://auth.example.com/t/acme")
///     .audience("https://api.example.com")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JwksVerifier {
    resolver: KeyResolver,
    config: Arc<VerifierConfig>,
}

impl JwksVerifier {
    /// Start building a verifier for tokens issued by `issuer`.
    pub fn builder(issuer: impl Into<String>) -> JwksVerifierBuilder {
        JwksVerifierBuilder {
            issuer: issuer.into(),
            audience: None,
            algorithm: Algorithm::RS256,
            leeway: Duration::ZERO,
            jwks_path: DEFAULT_JWKS_PATH.to_string(),
            key_ttl: Duration::from_secs(300),
            http_timeout: Duration::from_secs(5),
            http_client: None,
        }
    }

    /// The key resolver backing this verifier.
    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }
}

impl VerifyToken for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        // Header decode happens without signature verification and yields
        // nothing trusted: only the key id used for lookup.
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;

        if header.alg != self.config.algorithm {
            tracing::debug!(
                declared = ?header.alg,
                configured = ?self.config.algorithm,
                "token declared a different algorithm than configured"
            );
            return Err(AuthError::BadSignature);
        }

        let kid = header.kid.ok_or(AuthError::Malformed)?;

        let key = self.resolver.resolve(&kid).await.map_err(|err| {
            tracing::warn!(error = %err, "signing key resolution failed");
            AuthError::KeyUnavailable
        })?;

        // Signature check only; issuer/audience/expiry are checked explicitly
        // below so the taxonomy and boundary semantics stay exact.
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &key, &validation).map_err(|err| match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::BadSignature,
            _ => AuthError::Malformed,
        })?;

        check_claims(&data.claims, &self.config, unix_now())?;
        Ok(data.claims)
    }
}

/// Check issuer, audience and expiry against configuration.
///
/// Pure so boundary behavior is testable with a fixed clock. Expiry is
/// exclusive: a token is rejected once `now >= exp + leeway`, so a token
/// whose `exp` equals `now` is rejected under the default zero leeway.
pub(crate) fn check_claims(
    claims: &Claims,
    config: &VerifierConfig,
    now: u64,
) -> Result<(), AuthError> {
    if claims.iss.as_deref() != Some(config.issuer.as_str()) {
        return Err(AuthError::ClaimRejected(ClaimKind::Issuer));
    }

    match &claims.aud {
        Some(aud) if aud.contains(&config.audience) => {}
        _ => return Err(AuthError::ClaimRejected(ClaimKind::Audience)),
    }

    match claims.exp {
        Some(exp) if now < exp.saturating_add(config.leeway_secs) => Ok(()),
        _ => Err(AuthError::ClaimRejected(ClaimKind::Expiration)),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Builder for [`JwksVerifier`].
///
/// Consumes already-resolved configuration values; this crate does not load
/// configuration itself.
pub struct JwksVerifierBuilder {
    issuer: String,
    audience: Option<String>,
    algorithm: Algorithm,
    leeway: Duration,
    jwks_path: String,
    key_ttl: Duration,
    http_timeout: Duration,
    http_client: Option<reqwest::Client>,
}

impl JwksVerifierBuilder {
    /// Set the expected audience. Required.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the expected signing algorithm (RSA family only).
    ///
    /// Defaults to RS256. Tokens declaring any other algorithm are rejected.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the clock-skew allowance applied to expiry checks.
    ///
    /// Defaults to zero: a token is rejected the second its `exp` is reached.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Set the path appended to the issuer URL to locate the key set.
    ///
    /// Defaults to [`DEFAULT_JWKS_PATH`].
    pub fn jwks_path(mut self, path: impl Into<String>) -> Self {
        self.jwks_path = path.into();
        self
    }

    /// Set how long resolved signing keys are cached.
    ///
    /// Defaults to 5 minutes. A zero TTL disables caching, so every
    /// verification fetches the key set once.
    pub fn key_ttl(mut self, ttl: Duration) -> Self {
        self.key_ttl = ttl;
        self
    }

    /// Set the timeout for key set fetches.
    ///
    /// Defaults to 5 seconds. Ignored when a custom client is provided via
    /// [`http_client`](Self::http_client).
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Provide a custom HTTP client for key set fetches (proxies, TLS
    /// configuration, etc.). The client should carry its own timeout.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if no audience was configured, the algorithm is
    /// outside the RSA family, or the HTTP client cannot be constructed.
    pub fn build(self) -> Result<JwksVerifier, BuildError> {
        let audience = self.audience.ok_or(BuildError::MissingAudience)?;

        if !matches!(
            self.algorithm,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            return Err(BuildError::UnsupportedAlgorithm(self.algorithm));
        }

        let client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.http_timeout)
                .build()?,
        };

        let jwks_url = format!("{}{}", self.issuer.trim_end_matches('/'), self.jwks_path);
        let resolver = KeyResolver::new(jwks_url, client, self.key_ttl);

        Ok(JwksVerifier {
            resolver,
            config: Arc::new(VerifierConfig {
                issuer: self.issuer,
                audience,
                algorithm: self.algorithm,
                leeway_secs: self.leeway.as_secs(),
            }),
        })
    }
}
