//! RS256 token verification against the provider's signing keys.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use log::debug;

use super::claims::TokenClaims;
use super::jwks::KeyResolver;
use super::token::{JsonObject, ParsedToken};
use super::{AuthError, KeyError};

/// The only accepted signing algorithm.
const ACCEPTED_ALGORITHM: &str = "RS256";

/// Upper bound on the leeway handed to the claim checks.
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(24 * 60 * 60);

/// Verifies tokens for one audience and issuer.
#[derive(Clone)]
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    audience: String,
    issuer: String,
    validation: Validation,
    timeout: Option<Duration>,
}

impl TokenVerifier {
    pub fn new(
        resolver: Arc<dyn KeyResolver>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        let audience = audience.into();
        let issuer = issuer.into();
        let validation = build_validation(&audience, &issuer, Duration::ZERO);
        Self {
            resolver,
            audience,
            issuer,
            validation,
            timeout: None,
        }
    }

    /// Tolerance applied to `exp` and `nbf`.
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.validation = build_validation(&self.audience, &self.issuer, clock_skew);
        self
    }

    /// Bound on a whole verification, key fetch included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify signature and standard claims, returning the full claim set.
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.verify_untimed(token))
                .await
                .map_err(|_| AuthError::DeadlineExceeded)?,
            None => self.verify_untimed(token).await,
        }
    }

    async fn verify_untimed(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let parsed = ParsedToken::parse(token)?;

        match parsed.algorithm() {
            Some(ACCEPTED_ALGORITHM) => {}
            other => {
                return Err(AuthError::UnsupportedAlgorithm(
                    other.unwrap_or("missing").to_string(),
                ));
            }
        }

        let kid = parsed.kid().ok_or(KeyError::MissingKid)?;
        let key = self.resolver.resolve(kid).await?;
        if key.kid() != kid {
            return Err(AuthError::Internal(format!(
                "resolver returned key '{}' for kid '{}'",
                key.kid(),
                kid
            )));
        }

        let data = jsonwebtoken::decode::<JsonObject>(
            token,
            key.decoding_key(),
            &self.validation,
        )
        .map_err(|e| self.reject(kid, e))?;

        let claims = TokenClaims::new(data.claims);
        // the claim checks skip time claims they cannot read as whole seconds
        for name in ["exp", "nbf"] {
            if claims.get(name).is_some_and(|value| value.as_u64().is_none()) {
                return Err(AuthError::malformed(format!("invalid {name} value")));
            }
        }
        Ok(claims)
    }

    fn reject(&self, kid: &str, err: jsonwebtoken::errors::Error) -> AuthError {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidAudience => self.audience_mismatch(),
            ErrorKind::InvalidIssuer => self.issuer_mismatch(),
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => self.audience_mismatch(),
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => self.issuer_mismatch(),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm => {
                AuthError::UnsupportedAlgorithm(ACCEPTED_ALGORITHM.to_string())
            }
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::malformed(err.to_string()),
            _ => {
                debug!("Signature check errored for kid '{}': {}", kid, err);
                AuthError::InvalidSignature
            }
        }
    }

    fn audience_mismatch(&self) -> AuthError {
        AuthError::AudienceMismatch {
            expected: self.audience.clone(),
        }
    }

    fn issuer_mismatch(&self) -> AuthError {
        AuthError::IssuerMismatch {
            expected: self.issuer.clone(),
        }
    }
}

/// RS256 only, `aud` and `iss` required, `exp` checked when present.
fn build_validation(audience: &str, issuer: &str, clock_skew: Duration) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = clock_skew.min(MAX_CLOCK_SKEW).as_secs();
    validation.set_required_spec_claims(&["aud", "iss"]);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[issuer]);
    validation
}
