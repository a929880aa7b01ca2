//! Test utilities and common setup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use auth_service::api;
use auth_service::auth::{
    ClaimExtractor, Jwk, JwkSet, JwksFetcher, JwksResolver, KeyError, KeyResolver, TokenVerifier,
};
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

pub const AUDIENCE: &str = "https://api.provesi.com";
pub const DOMAIN: &str = "provesi.us.auth0.com";
pub const ISSUER: &str = "https://provesi.us.auth0.com/";

pub const PRIMARY_KID: &str = "key-primary";
pub const ROTATED_KID: &str = "key-rotated";

pub const PRIMARY_PEM: &[u8] = include_bytes!("../fixtures/primary.pem");
pub const ROTATED_PEM: &[u8] = include_bytes!("../fixtures/rotated.pem");
pub const PRIMARY_JWK: &str = include_str!("../fixtures/primary.jwk.json");
pub const ROTATED_JWK: &str = include_str!("../fixtures/rotated.jwk.json");

pub fn primary_jwk() -> Jwk {
    serde_json::from_str(PRIMARY_JWK).unwrap()
}

pub fn rotated_jwk() -> Jwk {
    serde_json::from_str(ROTATED_JWK).unwrap()
}

/// In-memory key set endpoint whose contents tests can swap.
#[derive(Clone, Default)]
pub struct FakeJwks {
    keys: Arc<Mutex<Vec<Jwk>>>,
    fetches: Arc<AtomicUsize>,
}

impl FakeJwks {
    pub fn with_keys(keys: Vec<Jwk>) -> Self {
        Self {
            keys: Arc::new(Mutex::new(keys)),
            fetches: Arc::default(),
        }
    }

    pub fn publish(&self, keys: Vec<Jwk>) {
        *self.keys.lock().unwrap() = keys;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JwksFetcher for FakeJwks {
    async fn fetch(&self) -> Result<JwkSet, KeyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(JwkSet {
            keys: self.keys.lock().unwrap().clone(),
        })
    }
}

/// Router plus handles on its key source.
pub struct TestApp {
    pub router: Router,
    pub jwks: FakeJwks,
    pub resolver: Arc<JwksResolver<FakeJwks>>,
}

/// Create a test application whose provider publishes only the primary key.
pub fn test_app() -> TestApp {
    test_app_with(FakeJwks::with_keys(vec![primary_jwk()]))
}

pub fn test_app_with(jwks: FakeJwks) -> TestApp {
    let resolver = Arc::new(JwksResolver::new(jwks.clone()));
    let key_resolver: Arc<dyn KeyResolver> = resolver.clone();

    let verifier = TokenVerifier::new(key_resolver, AUDIENCE, ISSUER)
        .with_timeout(std::time::Duration::from_secs(5));
    let state = api::AppState::new(verifier, ClaimExtractor::default());

    TestApp {
        router: api::create_router(state),
        jwks,
        resolver,
    }
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Claims that pass every check.
pub fn valid_claims() -> Value {
    json!({
        "sub": "auth0|user-1",
        "aud": AUDIENCE,
        "iss": ISSUER,
        "iat": now(),
        "exp": now() + 3600,
    })
}

/// Sign `claims` with RS256 under `kid`.
pub fn mint(pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

/// POST a JSON body.
pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// POST raw bytes labelled as JSON.
pub fn post_raw(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
