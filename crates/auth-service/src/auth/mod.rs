//! Token verification.
//!
//! Provides:
//! - Key resolution from the provider's JWKS with refresh-on-miss caching
//! - RS256 signature and standard claim verification
//! - Claim extraction into a normalized result
//! - Unverified decoding for diagnostics

mod claims;
mod config;
mod error;
mod jwks;
mod token;
mod verifier;

pub use claims::{ClaimExtractor, Identity, StandardClaims, TokenClaims, ValidationResult};
pub use config::{AuthConfig, ConfigValidationError, DEFAULT_ROLE_CLAIM};
pub use error::{AuthError, KeyError};
pub use jwks::{HttpJwksFetcher, Jwk, JwkSet, JwksFetcher, JwksResolver, KeyResolver, SigningKey};
pub use token::{DecodedToken, JsonObject, ParsedToken, decode_unverified};
pub use verifier::TokenVerifier;
