//! Tower middleware for bearer token authentication and scope enforcement.
//!
//! Provides [`BearerAuthLayer`] and [`BearerAuthService`], which extract the
//! bearer token from the `Authorization` header, verify it through a
//! [`VerifyToken`] implementation, check the [`ScopePolicy`], and inject
//! [`Claims`](crate::Claims) into request extensions for downstream handlers.
//!
//! The check order is fixed and visible here rather than hidden in handler
//! wrappers: extract, authenticate, authorize. A missing or malformed header
//! is rejected before the verifier runs, so no network call is made for
//! unauthenticated requests.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower::Layer;

use crate::error::AuthError;
use crate::scope::ScopePolicy;
use crate::verify::VerifyToken;

/// Tower layer that wraps services with bearer token authentication.
///
/// # Example
///
/// ```rust,no_run
/// use tower_jwks_auth::{BearerAuthLayer, JwksVerifier, ScopePolicy};
///
/// # fn main() -> Result<(), tower_jwks_auth::BuildError> {
/// let verifier = JwksVerifier::builder("https://auth.example.com/t/acme")
///     .audience("https://api.example.com")
///     .build()?;
///
/// let layer = BearerAuthLayer::new(verifier)
///     .scope_policy(ScopePolicy::new().path_scope("/courses", "read:courses"))
///     .public_path("/health");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BearerAuthLayer<V: VerifyToken> {
    verifier: V,
    scope_policy: ScopePolicy,
    public_paths: Vec<String>,
}

impl<V: VerifyToken> BearerAuthLayer<V> {
    /// Create a new layer using the given token verifier.
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            scope_policy: ScopePolicy::new(),
            public_paths: Vec::new(),
        }
    }

    /// Set the scope policy enforced after authentication.
    pub fn scope_policy(mut self, policy: ScopePolicy) -> Self {
        self.scope_policy = policy;
        self
    }

    /// Add a path prefix that bypasses authentication entirely.
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.push(path.into());
        self
    }
}

impl<S, V: VerifyToken> Layer<S> for BearerAuthLayer<V> {
    type Service = BearerAuthService<S, V>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            verifier: self.verifier.clone(),
            scope_policy: self.scope_policy.clone(),
            public_paths: self.public_paths.clone(),
        }
    }
}

/// Tower service that authenticates and authorizes each request.
///
/// Created by [`BearerAuthLayer`]. For each incoming request:
///
/// 1. Skips public path prefixes
/// 2. Extracts the `Authorization: Bearer <token>` header; absent or
///    malformed headers are denied with 401 before any verification
/// 3. Verifies the token via [`VerifyToken`]
/// 4. Checks the request path against the [`ScopePolicy`]
/// 5. On success, injects [`Claims`](crate::Claims) into request extensions
/// 6. On failure, returns 401/403 with a `WWW-Authenticate` header and a
///    stable, non-leaking message
#[derive(Clone)]
pub struct BearerAuthService<S, V: VerifyToken> {
    inner: S,
    verifier: V,
    scope_policy: ScopePolicy,
    public_paths: Vec<String>,
}

impl<S, V> tower_service::Service<Request<Body>> for BearerAuthService<S, V>
where
    S: tower_service::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<crate::BoxError> + Send,
    V: VerifyToken,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let path = req.uri().path().to_string();
        let public_paths = self.public_paths.clone();
        let verifier = self.verifier.clone();
        let scope_policy = self.scope_policy.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if public_paths.iter().any(|p| path.starts_with(p.as_str())) {
                return inner.call(req).await;
            }

            let token = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer)
                .map(String::from);

            let Some(token) = token else {
                return Ok(deny_response(&AuthError::Unauthenticated));
            };

            let claims = match verifier.verify(&token).await {
                Ok(claims) => claims,
                Err(error) => {
                    tracing::warn!(%path, %error, "request authentication failed");
                    return Ok(deny_response(&error));
                }
            };

            if let Err(error) = scope_policy.check(&path, &claims) {
                tracing::warn!(%path, %error, "request authorization failed");
                return Ok(deny_response(&error));
            }

            let mut req = req;
            req.extensions_mut().insert(claims);
            inner.call(req).await
        })
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly two space-separated parts with a `Bearer`
/// scheme; anything else is treated as no credentials.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Build the deny response for an authentication/authorization failure.
fn deny_response(error: &AuthError) -> Response {
    let status = match error.status_code() {
        403 => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    };

    let body = serde_json::json!({
        "error": error.public_message(),
    });

    let mut response = (status, axum::Json(body)).into_response();
    response.headers_mut().insert(
        "WWW-Authenticate",
        error
            .www_authenticate()
            .parse()
            .unwrap_or_else(|_| "Bearer".parse().expect("static header value")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Claims, ScopeClaim};
    use std::collections::HashMap;
    use tower::ServiceExt;
    use tower_service::Service;

    /// A minimal inner service that returns 200 OK for any request
    #[derive(Clone)]
    struct OkService;

    impl tower_service::Service<Request<Body>> for OkService {
        type Response = Response;
        type Error = std::convert::Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            Box::pin(async {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::empty())
                    .unwrap())
            })
        }
    }

    fn test_claims(scopes: &str) -> Claims {
        Claims {
            sub: Some("user123".to_string()),
            iss: Some("https://auth.example.com".to_string()),
            aud: None,
            exp: None,
            scope: Some(ScopeClaim::Delimited(scopes.to_string())),
            extra: HashMap::new(),
        }
    }

    /// Stub verifier returning a fixed outcome, no network involved.
    #[derive(Clone)]
    struct StubVerifier {
        outcome: Result<Claims, AuthError>,
    }

    impl VerifyToken for StubVerifier {
        async fn verify(&self, _token: &str) -> Result<Claims, AuthError> {
            self.outcome.clone()
        }
    }

    /// Verifier that panics if invoked; proves no verification (and thus no
    /// key fetch) happens for requests rejected at extraction.
    #[derive(Clone)]
    struct UnreachableVerifier;

    impl VerifyToken for UnreachableVerifier {
        async fn verify(&self, _token: &str) -> Result<Claims, AuthError> {
            panic!("verifier must not run for requests without credentials");
        }
    }

    fn allow_verifier(scopes: &str) -> StubVerifier {
        StubVerifier {
            outcome: Ok(test_claims(scopes)),
        }
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("bearer abc123"), None); // case sensitive
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer("abc123"), None); // one part
        assert_eq!(extract_bearer("Bearer abc 123"), None); // three parts
        assert_eq!(extract_bearer(""), None);
    }

    #[tokio::test]
    async fn test_missing_header_returns_401_without_verification() {
        let layer = BearerAuthLayer::new(UnreachableVerifier);
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get("WWW-Authenticate").unwrap(),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn test_malformed_header_returns_401_without_verification() {
        let layer = BearerAuthLayer::new(UnreachableVerifier);
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer abc extra-part")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_passes() {
        let layer = BearerAuthLayer::new(allow_verifier("read:courses"));
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer some-token")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejected_token_returns_401() {
        let layer = BearerAuthLayer::new(StubVerifier {
            outcome: Err(AuthError::BadSignature),
        });
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer bad-token")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let www_auth = resp
            .headers()
            .get("WWW-Authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(www_auth.contains("invalid_token"));
    }

    #[tokio::test]
    async fn test_insufficient_scope_returns_403() {
        let policy = ScopePolicy::new().path_scope("/courses", "write:courses");
        let layer = BearerAuthLayer::new(allow_verifier("read:courses")).scope_policy(policy);
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer some-token")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let www_auth = resp
            .headers()
            .get("WWW-Authenticate")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(www_auth.contains("insufficient_scope"));
    }

    #[tokio::test]
    async fn test_sufficient_scope_passes() {
        let policy = ScopePolicy::new().path_scope("/courses", "read:courses");
        let layer =
            BearerAuthLayer::new(allow_verifier("read:courses write:courses")).scope_policy(policy);
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer some-token")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_path_bypasses_auth() {
        let layer = BearerAuthLayer::new(UnreachableVerifier).public_path("/health");
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_claims_injected_into_extensions() {
        let layer = BearerAuthLayer::new(allow_verifier("read:courses"));

        // Inner service that checks for Claims in extensions
        #[derive(Clone)]
        struct CheckClaims;

        impl Service<Request<Body>> for CheckClaims {
            type Response = Response;
            type Error = std::convert::Infallible;
            type Future =
                Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: Request<Body>) -> Self::Future {
                let subject = req
                    .extensions()
                    .get::<Claims>()
                    .and_then(|c| c.sub.clone());
                Box::pin(async move {
                    let status = if subject.as_deref() == Some("user123") {
                        StatusCode::OK
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    };
                    Ok(Response::builder()
                        .status(status)
                        .body(Body::empty())
                        .unwrap())
                })
            }
        }

        let mut service = layer.layer(CheckClaims);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer some-token")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deny_body_is_stable_and_generic() {
        let layer = BearerAuthLayer::new(StubVerifier {
            outcome: Err(AuthError::ClaimRejected(crate::ClaimKind::Issuer)),
        });
        let mut service = layer.layer(OkService);

        let req = Request::builder()
            .uri("/courses")
            .header("Authorization", "Bearer some-token")
            .body(Body::empty())
            .unwrap();

        let resp = service.ready().await.unwrap().call(req).await.unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid access token");
    }
}
