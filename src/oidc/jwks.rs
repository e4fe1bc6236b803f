//! JWKS (JSON Web Key Set) fetching and caching.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::ValidationConfig;
use crate::error::{AuthError, ConfigError};

/// Source of verification keys, looked up by key identifier.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_key(&self, kid: &str) -> Result<SigningKey, AuthError>;
}

/// A provider public key usable for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key: DecodingKey,
    algorithm: Option<Algorithm>,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, key: DecodingKey, algorithm: Option<Algorithm>) -> Self {
        Self {
            kid: kid.into(),
            key,
            algorithm,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Algorithm advertised by the JWK `alg` member, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// One complete fetched key set. Replaced wholesale, never mutated.
struct KeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
}

impl KeySet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

const DEFAULT_MIN_REFETCH: Duration = Duration::from_secs(10);

/// JWKS cache with TTL-bounded refresh.
pub struct JwksCache {
    /// Current key set. Readers clone the `Arc`; refresh swaps it.
    entry: RwLock<Option<Arc<KeySet>>>,
    /// How long a key set is served before it is fetched again
    ttl: Duration,
    /// JWKS endpoint URL
    jwks_url: String,
    /// HTTP client
    http_client: reqwest::Client,
    /// Minimum age of a fresh set before an unknown kid refetches
    min_refetch: Duration,
    /// Number of fetches attempted
    fetches: AtomicU64,
}

/// JWKS response from the endpoint.
#[derive(Debug, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID
    pub kid: Option<String>,
    /// Algorithm
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    // RSA parameters
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,

    // EC parameters
    /// EC curve
    pub crv: Option<String>,
    /// EC x coordinate (base64url)
    pub x: Option<String>,
    /// EC y coordinate (base64url)
    pub y: Option<String>,
}

impl JwksCache {
    /// Create an empty cache. Nothing is fetched until the first lookup or
    /// an explicit [`JwksCache::refresh`].
    pub fn new(config: &ValidationConfig) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.jwks_timeout())
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self::with_client(
            config.jwks_url.clone(),
            config.jwks_ttl(),
            http_client,
        )
        .with_min_refetch_interval(config.jwks_min_refetch()))
    }

    pub fn with_client(jwks_url: String, ttl: Duration, http_client: reqwest::Client) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
            jwks_url,
            http_client,
            min_refetch: DEFAULT_MIN_REFETCH,
            fetches: AtomicU64::new(0),
        }
    }

    /// Set how old a fresh key set must be before a lookup for an unknown
    /// kid fetches it again.
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch = interval;
        self
    }

    /// Get a signing key by key ID.
    ///
    /// Served from memory while the cached set is younger than the TTL and
    /// contains `kid`. Otherwise the set is fetched again, which also picks
    /// up keys rotated in since the last fetch. Unknown kids refetch at most
    /// once per refetch interval.
    ///
    /// If the fetch fails, a key held by the previous set is still served.
    pub async fn get_key(&self, kid: &str) -> Result<SigningKey, AuthError> {
        let previous = self.snapshot();
        if let Some(set) = &previous {
            if set.is_fresh(self.ttl) {
                if let Some(key) = set.keys.get(kid) {
                    return Ok(key.clone());
                }
                if set.fetched_at.elapsed() < self.min_refetch {
                    debug!(kid = %kid, "Key not found in recently fetched JWKS");
                    return Err(AuthError::KeyNotFound {
                        kid: kid.to_string(),
                    });
                }
                debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
            } else {
                debug!(kid = %kid, "Cached JWKS expired, refreshing");
            }
        }

        match self.fetch_and_publish().await {
            Ok(set) => set
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| AuthError::KeyNotFound {
                    kid: kid.to_string(),
                }),
            Err(e) => match previous.as_ref().and_then(|set| set.keys.get(kid)) {
                Some(key) => {
                    warn!(kid = %kid, error = %e, "JWKS refresh failed, serving previously fetched key");
                    Ok(key.clone())
                }
                None => Err(e),
            },
        }
    }

    /// Force refresh the JWKS cache.
    ///
    /// On failure the previous key set, if any, is left in place.
    pub async fn refresh(&self) -> Result<usize, AuthError> {
        let set = self.fetch_and_publish().await?;
        Ok(set.keys.len())
    }

    /// Number of fetches attempted since creation.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of keys in the current set, stale or not.
    pub fn key_count(&self) -> usize {
        self.snapshot().map(|set| set.keys.len()).unwrap_or(0)
    }

    fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_and_publish(&self) -> Result<Arc<KeySet>, AuthError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("request to {} failed: {}", self.jwks_url, e)))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("failed to read JWKS body: {}", e)))?;

        let jwks: Jwks = serde_json::from_slice(&body)
            .map_err(|e| AuthError::KeyFetch(format!("failed to parse JWKS: {}", e)))?;

        let set = Arc::new(KeySet {
            keys: Self::load_keys(jwks),
            fetched_at: Instant::now(),
        });

        // The write lock only covers the pointer swap.
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&set));

        info!(
            url = %self.jwks_url,
            key_count = set.keys.len(),
            "JWKS cache refreshed"
        );

        Ok(set)
    }

    fn load_keys(jwks: Jwks) -> HashMap<String, SigningKey> {
        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            // Skip encryption keys
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }

            let Some(kid) = jwk.kid.clone() else {
                debug!(kty = %jwk.kty, "Skipping JWK without kid");
                continue;
            };

            match Self::jwk_to_signing_key(&kid, &jwk) {
                Ok(key) => {
                    debug!(kid = %kid, kty = %jwk.kty, "Loaded JWK");
                    keys.insert(kid, key);
                }
                Err(e) => {
                    warn!(
                        kid = %kid,
                        kty = %jwk.kty,
                        error = %e,
                        "Failed to parse JWK, skipping"
                    );
                }
            }
        }
        keys
    }

    /// Convert a JWK to a SigningKey.
    fn jwk_to_signing_key(kid: &str, jwk: &Jwk) -> Result<SigningKey, String> {
        let algorithm = jwk
            .alg
            .as_deref()
            .map(Algorithm::from_str)
            .transpose()
            .map_err(|e| format!("unknown alg: {}", e))?;

        let key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("RSA key missing 'n'")?;
                let e = jwk.e.as_deref().ok_or("RSA key missing 'e'")?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| format!("invalid RSA components: {}", e))?
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or("EC key missing 'x'")?;
                let y = jwk.y.as_deref().ok_or("EC key missing 'y'")?;
                match jwk.crv.as_deref() {
                    Some("P-256") | Some("P-384") => DecodingKey::from_ec_components(x, y)
                        .map_err(|e| format!("invalid EC components: {}", e))?,
                    Some(crv) => return Err(format!("Unsupported EC curve: {}", crv)),
                    None => return Err("EC key missing 'crv'".to_string()),
                }
            }
            kty => return Err(format!("Unsupported key type: {}", kty)),
        };

        Ok(SigningKey::new(kid, key, algorithm))
    }
}

#[async_trait]
impl KeyProvider for JwksCache {
    async fn get_key(&self, kid: &str) -> Result<SigningKey, AuthError> {
        JwksCache::get_key(self, kid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{jwks_document, TestKey};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cache_for(server: &MockServer, ttl: Duration) -> JwksCache {
        JwksCache::with_client(
            format!("{}/.well-known/jwks.json", server.uri()),
            ttl,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_jwk_parsing() {
        let jwk_json = r#"{
            "kty": "RSA",
            "kid": "test-key-1",
            "alg": "RS256",
            "use": "sig",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB"
        }"#;

        let jwk: Jwk = serde_json::from_str(jwk_json).unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid, Some("test-key-1".to_string()));

        let key = JwksCache::jwk_to_signing_key("test-key-1", &jwk).unwrap();
        assert_eq!(key.kid(), "test-key-1");
        assert_eq!(key.algorithm(), Some(Algorithm::RS256));
    }

    #[test]
    fn test_load_keys_skips_unusable_entries() {
        let jwks: Jwks = serde_json::from_value(serde_json::json!({
            "keys": [
                TestKey::primary().jwk(),
                { "kty": "RSA", "kid": "enc-key", "use": "enc", "n": "AQAB", "e": "AQAB" },
                { "kty": "RSA", "n": "AQAB", "e": "AQAB" },
                { "kty": "oct", "kid": "symmetric", "k": "c2VjcmV0" },
                { "kty": "RSA", "kid": "no-modulus", "e": "AQAB" }
            ]
        }))
        .unwrap();

        let keys = JwksCache::load_keys(jwks);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key(TestKey::primary().kid));
    }

    #[tokio::test]
    async fn test_lookups_within_ttl_fetch_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_document(&[&TestKey::primary()])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, Duration::from_secs(300));
        let kid = TestKey::primary().kid;

        assert_eq!(cache.get_key(kid).await.unwrap().kid(), kid);
        assert_eq!(cache.get_key(kid).await.unwrap().kid(), kid);
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(cache.key_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_after_fresh_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_document(&[&TestKey::primary()])),
            )
            .mount(&server)
            .await;

        let cache = cache_for(&server, Duration::from_secs(300));
        let err = cache.get_key("missing-kid").await.unwrap_err();
        assert_eq!(
            err,
            AuthError::KeyNotFound {
                kid: "missing-kid".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_kid_refetch_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_document(&[&TestKey::primary()])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, Duration::from_secs(300));
        cache.get_key(TestKey::primary().kid).await.unwrap();

        for kid in ["forged-1", "forged-2", "forged-3"] {
            assert!(matches!(
                cache.get_key(kid).await,
                Err(AuthError::KeyNotFound { .. })
            ));
        }
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        for suffix in ["/status", "/garbage"] {
            let cache = JwksCache::with_client(
                format!("{}{}", server.uri(), suffix),
                Duration::from_secs(300),
                reqwest::Client::new(),
            );
            let err = cache.get_key("any").await.unwrap_err();
            assert_eq!(err.kind(), "key_fetch", "{}: {}", suffix, err);
        }

        let unreachable = JwksCache::with_client(
            "http://127.0.0.1:1/.well-known/jwks.json".to_string(),
            Duration::from_secs(300),
            reqwest::Client::new(),
        );
        assert_eq!(
            unreachable.get_key("any").await.unwrap_err().kind(),
            "key_fetch"
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_document(&[&TestKey::primary()])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = cache_for(&server, Duration::from_secs(300));
        assert_eq!(cache.refresh().await.unwrap(), 1);
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.key_count(), 1);

        // Still fresh, so served without touching the failing endpoint.
        assert!(cache.get_key(TestKey::primary().kid).await.is_ok());
        assert_eq!(cache.fetch_count(), 2);
    }
}
