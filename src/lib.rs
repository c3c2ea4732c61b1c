//! # tower-jwks-auth
//!
//! Tower middleware for verifying bearer JWTs against a remote JWK set and
//! enforcing scope-based access control before protected handlers run.
//!
//! ## Architecture
//!
//! - **Key Resolver** ([`KeyResolver`]): fetches the identity provider's
//!   published key set from `<issuer>/.well-known/jwks` and resolves RSA
//!   signing keys by key id, with a bounded-TTL cache and single-flight
//!   refresh.
//!
//! - **Token Verifier** ([`JwksVerifier`]): pluggable via the [`VerifyToken`]
//!   trait. Verifies the signature under the server-configured algorithm
//!   (never the one the token declares), then checks issuer, audience and
//!   expiry. [`Claims`] exist only as the output of a successful
//!   verification — there is no decode-without-verify path.
//!
//! - **Scope Authorizer** ([`ScopePolicy`]/[`ScopeRequirement`]): pure
//!   membership check of required scopes against the token's granted scopes.
//!
//! - **HTTP Middleware** ([`BearerAuthLayer`]/[`BearerAuthService`]): tower
//!   middleware that extracts bearer tokens, runs the verifier and the scope
//!   policy in order, and injects [`Claims`] into request extensions.
//!
//! Failures map to stable responses: 401 for anything wrong with the
//! credentials themselves, 403 for a valid token lacking the required scope.
//! Internal detail (which claim failed, which key id was requested) is logged
//! via [`tracing`] and never exposed to the caller.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::{Extension, Router, routing::get};
//! use tower_jwks_auth::{BearerAuthLayer, Claims, JwksVerifier, ScopePolicy};
//!
//! async fn courses(Extension(claims): Extension<Claims>) -> String {
//!     format!("hello, {}", claims.sub.as_deref().unwrap_or("anonymous"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tower_jwks_auth::BoxError> {
//!     let verifier = JwksVerifier::builder("https://auth.example.com/t/acme")
//!         .audience("https://api.example.com")
//!         .build()?;
//!
//!     let policy = ScopePolicy::new().path_scope("/courses", "read:courses");
//!
//!     let app = Router::new()
//!         .route("/courses", get(courses))
//!         .layer(
//!             BearerAuthLayer::new(verifier)
//!                 .scope_policy(policy)
//!                 .public_path("/health"),
//!         );
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Check order
//!
//! Within one request the pipeline is strictly sequential: header extraction
//! (no credentials → 401 before any network I/O), signature verification,
//! claim checks, scope check. Requests are independent; the only state shared
//! across them is the key cache, which takes concurrent reads and
//! single-flight writes.

pub mod claims;
pub mod error;
pub mod jwks;
pub mod middleware;
pub mod scope;
pub mod verify;

// Re-exports
pub use claims::{Claims, ScopeClaim, TokenAudience};
pub use error::{AuthError, BoxError, BuildError, ClaimKind};
pub use jwks::{DEFAULT_JWKS_PATH, Jwk, JwkSet, KeyError, KeyResolver};
pub use middleware::{BearerAuthLayer, BearerAuthService, extract_bearer};
pub use scope::{ScopePolicy, ScopeRequirement};
pub use verify::{JwksVerifier, JwksVerifierBuilder, VerifyToken};
