//! Remote signing key resolution.
//!
//! [`KeyResolver`] fetches the identity provider's published JWK set and
//! resolves individual RSA signing keys by key id. Resolved keys are cached
//! with a bounded TTL; cache misses serialize through a single-flight lock,
//! and a set refreshed moments ago answers further misses directly, so a
//! burst of tokens naming an unpublished key id produces at most one fetch,
//! not a stampede.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

/// Default path appended to the issuer URL to locate the key set.
pub const DEFAULT_JWKS_PATH: &str = "/.well-known/jwks";

/// One public key entry from a JWK set.
///
/// Only the fields this resolver needs are named; RSA material (`n`, `e`) is
/// optional at the serde level so key sets containing non-RSA entries still
/// parse, and rejected per-entry when a key is actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, e.g. `"RSA"`.
    pub kty: String,
    /// Key identifier, unique within one fetch of the set.
    pub kid: String,
    /// Intended algorithm, e.g. `"RS256"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use, e.g. `"sig"`.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus, base64url-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent, base64url-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Convert this entry's raw material into a usable decoding key.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, KeyError> {
        if self.kty != "RSA" {
            return Err(KeyError::Unusable {
                kid: self.kid.clone(),
            });
        }
        match (&self.n, &self.e) {
            (Some(n), Some(e)) => {
                DecodingKey::from_rsa_components(n, e).map_err(|_| KeyError::Unusable {
                    kid: self.kid.clone(),
                })
            }
            _ => Err(KeyError::Unusable {
                kid: self.kid.clone(),
            }),
        }
    }
}

/// A JWK set as published at the provider's well-known endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    /// The published keys, in provider order.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find the first entry with the given key id.
    ///
    /// Key ids are assumed unique within a fetch; if the provider violates
    /// this, first match wins.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// Key resolution failure.
///
/// Callers outside this crate see all variants collapsed into
/// [`AuthError::KeyUnavailable`](crate::AuthError::KeyUnavailable); the
/// variants exist so the distinction can be logged internally.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// No entry in the fetched key set matched the requested key id.
    #[error("no key with id {kid:?} in key set")]
    NotFound {
        /// The requested key id.
        kid: String,
    },

    /// The key set could not be fetched or parsed.
    #[error("key set fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The entry matching the requested key id could not be converted into a
    /// key (wrong key type, or missing RSA material).
    #[error("key {kid:?} is not a usable RSA key")]
    Unusable {
        /// The unusable entry's key id.
        kid: String,
    },
}

/// Floor between miss-triggered refreshes of a still-fresh set. Tokens
/// naming an unpublished key id resolve against the cached set inside this
/// window instead of forcing a fetch each.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Default)]
struct CacheState {
    keys: HashMap<String, Arc<DecodingKey>>,
    refreshed_at: Option<Instant>,
}

struct ResolverInner {
    jwks_url: String,
    client: reqwest::Client,
    ttl: Duration,
    cache: RwLock<CacheState>,
    // Single-flight guard: one fetch at a time populates the cache.
    refresh: Mutex<()>,
}

/// Resolves RSA signing keys by key id from a remote JWK set.
///
/// Cheap to clone; clones share the cache. With a zero TTL the cache is
/// bypassed entirely and every resolution performs exactly one fetch.
#[derive(Clone)]
pub struct KeyResolver {
    inner: Arc<ResolverInner>,
}

impl KeyResolver {
    /// Create a resolver for the given JWK set URL.
    ///
    /// The provided `client` should carry a request timeout so a slow
    /// provider cannot stall callers indefinitely.
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                jwks_url: jwks_url.into(),
                client,
                ttl,
                cache: RwLock::new(CacheState::default()),
                refresh: Mutex::new(()),
            }),
        }
    }

    /// The URL this resolver fetches the key set from.
    pub fn jwks_url(&self) -> &str {
        &self.inner.jwks_url
    }

    /// Resolve the signing key with the given key id.
    ///
    /// Serves from the cache when the entry is fresh, otherwise fetches the
    /// key set and caches every usable key in it. A set refreshed within the
    /// last few seconds answers misses directly, so requests for a key id the
    /// provider does not publish cannot each force a fetch.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        if self.inner.ttl.is_zero() {
            let set = self.fetch().await?;
            return Self::find_in(&set, kid);
        }

        if let Some(key) = self.cached(kid).await {
            tracing::debug!(kid, "signing key cache hit");
            return Ok(key);
        }

        let missed_at = Instant::now();
        let _guard = self.inner.refresh.lock().await;
        {
            let state = self.inner.cache.read().await;
            if let Some(refreshed_at) = state.refreshed_at {
                let age = refreshed_at.elapsed();
                // A refresh that completed after this miss answers it, even
                // when the answer is "the provider does not publish that kid".
                // A still-fresh set refreshed inside the minimum interval
                // answers it too, so unknown kids cannot force a fetch each.
                if refreshed_at > missed_at
                    || (age < self.inner.ttl && age < MIN_REFRESH_INTERVAL)
                {
                    return match state.keys.get(kid) {
                        Some(key) => Ok(Arc::clone(key)),
                        None => Err(KeyError::NotFound {
                            kid: kid.to_string(),
                        }),
                    };
                }
            }
        }

        tracing::debug!(url = %self.inner.jwks_url, kid, "refreshing key set");
        self.refresh_and_find(kid).await
    }

    async fn cached(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let state = self.inner.cache.read().await;
        if !state
            .refreshed_at
            .is_some_and(|t| t.elapsed() < self.inner.ttl)
        {
            return None;
        }
        state.keys.get(kid).map(Arc::clone)
    }

    async fn refresh_and_find(&self, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        let set = self.fetch().await?;

        let mut keys = HashMap::new();
        for jwk in &set.keys {
            match jwk.to_decoding_key() {
                Ok(key) => {
                    keys.entry(jwk.kid.clone()).or_insert_with(|| Arc::new(key));
                }
                Err(_) => {
                    tracing::debug!(kid = %jwk.kid, "skipping unusable key set entry");
                }
            }
        }

        // Replace wholesale so rotated-out keys stop verifying.
        *self.inner.cache.write().await = CacheState {
            keys,
            refreshed_at: Some(Instant::now()),
        };

        Self::find_in(&set, kid)
    }

    fn find_in(set: &JwkSet, kid: &str) -> Result<Arc<DecodingKey>, KeyError> {
        match set.find(kid) {
            Some(jwk) => jwk.to_decoding_key().map(Arc::new),
            None => Err(KeyError::NotFound {
                kid: kid.to_string(),
            }),
        }
    }

    async fn fetch(&self) -> Result<JwkSet, KeyError> {
        let set = self
            .inner
            .client
            .get(&self.inner.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk() -> Jwk {
        serde_json::from_str(include_str!("../tests/fixtures/rsa_public.jwk.json")).unwrap()
    }

    #[test]
    fn test_jwk_set_roundtrip() {
        let set = JwkSet {
            keys: vec![rsa_jwk()],
        };
        let serialized = serde_json::to_string(&set).unwrap();
        let decoded: JwkSet = serde_json::from_str(&serialized).unwrap();
        assert_eq!(decoded.keys.len(), 1);
        assert_eq!(decoded.keys[0].kid, "test-key-1");
    }

    #[test]
    fn test_rsa_jwk_converts() {
        assert!(rsa_jwk().to_decoding_key().is_ok());
    }

    #[test]
    fn test_non_rsa_jwk_is_unusable() {
        let jwk = Jwk {
            kty: "EC".to_string(),
            kid: "ec-1".to_string(),
            alg: None,
            key_use: None,
            n: None,
            e: None,
        };
        assert!(matches!(
            jwk.to_decoding_key(),
            Err(KeyError::Unusable { .. })
        ));
    }

    #[test]
    fn test_rsa_jwk_without_material_is_unusable() {
        let jwk = Jwk {
            kty: "RSA".to_string(),
            kid: "bare".to_string(),
            alg: None,
            key_use: None,
            n: None,
            e: None,
        };
        assert!(matches!(
            jwk.to_decoding_key(),
            Err(KeyError::Unusable { .. })
        ));
    }

    #[test]
    fn test_find_first_match_wins() {
        let mut first = rsa_jwk();
        first.alg = Some("RS256".to_string());
        let mut second = rsa_jwk();
        second.alg = Some("RS384".to_string());
        let set = JwkSet {
            keys: vec![first, second],
        };
        let found = set.find("test-key-1").unwrap();
        assert_eq!(found.alg.as_deref(), Some("RS256"));
    }

    #[test]
    fn test_lookup_surfaces_unusable_matching_entry() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{"kty": "EC", "kid": "ec-1", "crv": "P-256"}]
        }))
        .unwrap();
        assert!(matches!(
            KeyResolver::find_in(&set, "ec-1"),
            Err(KeyError::Unusable { .. })
        ));
    }

    #[test]
    fn test_lookup_reports_absent_kid_as_not_found() {
        let set = JwkSet {
            keys: vec![rsa_jwk()],
        };
        assert!(matches!(
            KeyResolver::find_in(&set, "absent"),
            Err(KeyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_parses_set_with_foreign_key_types() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                {"kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "...", "y": "..."},
                {"kty": "RSA", "kid": "rsa-1", "n": "abc", "e": "AQAB"}
            ]
        }))
        .unwrap();
        assert_eq!(set.keys.len(), 2);
        assert!(set.find("rsa-1").is_some());
    }
}
