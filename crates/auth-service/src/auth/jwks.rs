//! Signing key resolution from the provider's published key set.
//!
//! Keys are cached per `kid`. A miss triggers one refresh of the whole set;
//! concurrent misses queue behind a single in-flight fetch and reuse its outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::KeyError;

/// An RSA public key the provider signs tokens with.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key: DecodingKey,
}

impl SigningKey {
    /// Build from base64url modulus and exponent.
    pub fn from_rsa_components(kid: impl Into<String>, n: &str, e: &str) -> Result<Self, KeyError> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| KeyError::Retrieval(format!("invalid RSA key '{kid}': {e}")))?;
        Ok(Self { kid, key })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

/// A JSON Web Key entry. Only the RSA fields are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

/// The provider's key set document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// RSA signing keys indexed by `kid`.
    ///
    /// Entries that are not RSA, are marked for encryption, or lack a `kid`
    /// or key material are skipped. A set without any usable key is an error.
    pub fn signing_keys(&self) -> Result<HashMap<String, Arc<SigningKey>>, KeyError> {
        let mut keys = HashMap::new();

        for jwk in &self.keys {
            if jwk.kty != "RSA" || jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            let (Some(kid), Some(n), Some(e)) = (&jwk.kid, &jwk.n, &jwk.e) else {
                continue;
            };

            match SigningKey::from_rsa_components(kid.as_str(), n, e) {
                Ok(key) => {
                    keys.insert(kid.clone(), Arc::new(key));
                }
                Err(err) => warn!("Skipping JWKS entry: {}", err),
            }
        }

        if keys.is_empty() {
            return Err(KeyError::Retrieval(
                "the JWKS endpoint did not contain any signing keys".to_string(),
            ));
        }

        Ok(keys)
    }
}

/// Source of the provider's key set.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, KeyError>;
}

/// Fetches the key set over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
    uri: String,
}

impl HttpJwksFetcher {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("auth-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building JWKS HTTP client")?;

        Ok(Self {
            client,
            uri: uri.into(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<JwkSet, KeyError> {
        let response = self
            .client
            .get(&self.uri)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| KeyError::Retrieval(format!("request to {} failed: {}", self.uri, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyError::Retrieval(format!(
                "{} returned HTTP {}",
                self.uri, status
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| KeyError::Retrieval(format!("invalid JWKS document: {}", e)))
    }
}

/// Looks up the key a token was signed with.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Return the key whose identifier is exactly `kid`.
    async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError>;
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn is_stale(&self, max_age: Option<Duration>) -> bool {
        match (max_age, self.fetched_at) {
            (Some(max_age), Some(fetched_at)) => fetched_at.elapsed() >= max_age,
            _ => false,
        }
    }
}

#[derive(Default)]
struct RefreshState {
    last_error: Option<KeyError>,
}

/// Caching resolver over a [`JwksFetcher`].
pub struct JwksResolver<F = HttpJwksFetcher> {
    fetcher: F,
    cache: RwLock<KeyCache>,
    refresh: Mutex<RefreshState>,
    // bumped after every refresh attempt, successful or not
    attempts: AtomicU64,
    max_age: Option<Duration>,
}

impl<F: JwksFetcher> JwksResolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(KeyCache::default()),
            refresh: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
            max_age: None,
        }
    }

    /// Refresh the set on next use once it is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Number of refresh attempts made so far.
    pub fn refresh_count(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Fetch the key set now, e.g. to warm the cache at startup.
    ///
    /// Returns the number of signing keys cached.
    pub async fn refresh(&self) -> Result<usize, KeyError> {
        let mut state = self.refresh.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut RefreshState) -> Result<usize, KeyError> {
        let outcome = self
            .fetcher
            .fetch()
            .await
            .and_then(|set| set.signing_keys());

        let result = match outcome {
            Ok(keys) => {
                let count = keys.len();
                let mut cache = self.cache.write().await;
                cache.keys = keys;
                cache.fetched_at = Some(Instant::now());
                info!("Refreshed signing keys ({} cached)", count);
                state.last_error = None;
                Ok(count)
            }
            Err(err) => {
                warn!("Signing key refresh failed: {}", err);
                state.last_error = Some(err.clone());
                Err(err)
            }
        };

        self.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn lookup(&self, kid: &str) -> (Option<Arc<SigningKey>>, bool) {
        let cache = self.cache.read().await;
        (cache.keys.get(kid).cloned(), cache.is_stale(self.max_age))
    }
}

#[async_trait]
impl<F: JwksFetcher> KeyResolver for JwksResolver<F> {
    async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
        let observed = self.attempts.load(Ordering::Acquire);

        let (cached, stale) = self.lookup(kid).await;
        if let (Some(key), false) = (&cached, stale) {
            return Ok(Arc::clone(key));
        }
        debug!("Signing key '{}' not cached or stale, refreshing", kid);

        let mut state = self.refresh.lock().await;

        // Another caller refreshed while we waited for the lock.
        if self.attempts.load(Ordering::Acquire) != observed {
            if let (Some(key), _) = self.lookup(kid).await {
                return Ok(key);
            }
            if let Some(ref err) = state.last_error {
                return Err(err.clone());
            }
            return Err(KeyError::NotFound(kid.to_string()));
        }

        match self.refresh_locked(&mut state).await {
            Ok(_) => {}
            Err(err) => {
                // Expired entries are still better than nothing when the
                // provider is unreachable.
                if let Some(key) = cached {
                    warn!("Serving stale signing key '{}' after failed refresh", kid);
                    return Ok(key);
                }
                return Err(err);
            }
        }

        self.lookup(kid)
            .await
            .0
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::AtomicUsize;

    const PRIMARY_JWK: &str = include_str!("../../tests/fixtures/primary.jwk.json");

    fn rsa_jwk(kid: &str) -> Jwk {
        let mut jwk: Jwk = serde_json::from_str(PRIMARY_JWK).unwrap();
        jwk.kid = Some(kid.to_string());
        jwk
    }

    /// Serves a fixed set of kids, counting fetches.
    struct CountingFetcher {
        kids: std::sync::Mutex<Vec<String>>,
        fetches: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new(kids: &[&str]) -> Self {
            Self {
                kids: std::sync::Mutex::new(kids.iter().map(|k| k.to_string()).collect()),
                fetches: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(&[])
            }
        }

        fn rotate(&self, kids: &[&str]) {
            *self.kids.lock().unwrap() = kids.iter().map(|k| k.to_string()).collect();
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JwksFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<JwkSet, KeyError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(KeyError::Retrieval("connection refused".to_string()));
            }
            let kids = self.kids.lock().unwrap().clone();
            Ok(JwkSet {
                keys: kids.iter().map(|kid| rsa_jwk(kid)).collect(),
            })
        }
    }

    #[test]
    fn test_signing_keys_filters_entries() {
        let mut enc = rsa_jwk("enc");
        enc.key_use = Some("enc".to_string());
        let mut ec = rsa_jwk("ec");
        ec.kty = "EC".to_string();
        let mut no_kid = rsa_jwk("x");
        no_kid.kid = None;
        let mut no_use = rsa_jwk("no-use");
        no_use.key_use = None;

        let set = JwkSet {
            keys: vec![rsa_jwk("k1"), enc, ec, no_kid, no_use],
        };
        let keys = set.signing_keys().unwrap();
        let mut kids: Vec<_> = keys.keys().cloned().collect();
        kids.sort();
        assert_eq!(kids, vec!["k1".to_string(), "no-use".to_string()]);
        assert_eq!(keys["k1"].kid(), "k1");
    }

    #[test]
    fn test_signing_keys_empty_set_is_retrieval_error() {
        let err = JwkSet::default().signing_keys().unwrap_err();
        assert_eq!(err.kind(), "KeyRetrievalError");
    }

    #[test]
    fn test_jwk_set_parses_provider_document() {
        let doc = r#"{"keys":[{"alg":"RS256","kty":"RSA","use":"sig","n":"AQAB","e":"AQAB","kid":"abc","x5t":"t","x5c":["MIIC"]}]}"#;
        let set: JwkSet = serde_json::from_str(doc).unwrap();
        assert_eq!(set.keys.len(), 1);
        assert_eq!(set.keys[0].kid.as_deref(), Some("abc"));
        assert_eq!(set.keys[0].key_use.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let resolver = JwksResolver::new(CountingFetcher::new(&["k1"]));
        assert_eq!(resolver.resolve("k1").await.unwrap().kid(), "k1");
        assert_eq!(resolver.resolve("k1").await.unwrap().kid(), "k1");
        assert_eq!(resolver.fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_once() {
        let resolver = JwksResolver::new(CountingFetcher::new(&["k1"]));
        resolver.refresh().await.unwrap();
        assert_eq!(resolver.fetcher.fetches(), 1);

        let err = resolver.resolve("gone").await.unwrap_err();
        assert_eq!(err, KeyError::NotFound("gone".to_string()));
        assert_eq!(resolver.fetcher.fetches(), 2);
    }

    #[tokio::test]
    async fn test_rotated_key_found_after_refresh() {
        let resolver = JwksResolver::new(CountingFetcher::new(&["old"]));
        resolver.resolve("old").await.unwrap();

        resolver.fetcher.rotate(&["new"]);
        assert_eq!(resolver.resolve("new").await.unwrap().kid(), "new");
        assert_eq!(resolver.fetcher.fetches(), 2);

        // the refresh replaced the whole set
        assert!(resolver.resolve("old").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retrieval_error() {
        let resolver = JwksResolver::new(CountingFetcher::failing());
        let err = resolver.resolve("k1").await.unwrap_err();
        assert_eq!(err.kind(), "KeyRetrievalError");
        assert_eq!(resolver.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let mut fetcher = CountingFetcher::new(&["k1"]);
        fetcher.delay = Duration::from_millis(50);
        let resolver = JwksResolver::new(fetcher);

        let results = join_all((0..16).map(|_| resolver.resolve("k1"))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(resolver.fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_fetch() {
        let mut fetcher = CountingFetcher::failing();
        fetcher.delay = Duration::from_millis(50);
        let resolver = JwksResolver::new(fetcher);

        let results = join_all((0..8).map(|_| resolver.resolve("k1"))).await;

        for result in results {
            assert_eq!(result.unwrap_err().kind(), "KeyRetrievalError");
        }
        assert_eq!(resolver.fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_max_age_forces_refresh() {
        let resolver = JwksResolver::new(CountingFetcher::new(&["k1"]))
            .with_max_age(Some(Duration::from_millis(20)));
        resolver.resolve("k1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        resolver.resolve("k1").await.unwrap();
        assert_eq!(resolver.fetcher.fetches(), 2);
    }

    #[tokio::test]
    async fn test_stale_key_served_when_refresh_fails() {
        let resolver = JwksResolver::new(CountingFetcher::new(&["k1"]))
            .with_max_age(Some(Duration::from_millis(20)));
        resolver.resolve("k1").await.unwrap();

        resolver.fetcher.rotate(&[]);
        tokio::time::sleep(Duration::from_millis(40)).await;

        // the empty set fails to refresh, the expired key is still served
        assert_eq!(resolver.resolve("k1").await.unwrap().kid(), "k1");
        assert_eq!(resolver.fetcher.fetches(), 2);
    }
}
