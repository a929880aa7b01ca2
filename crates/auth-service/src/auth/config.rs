//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Claim consulted before the plain `rol` claim when extracting a role.
pub const DEFAULT_ROLE_CLAIM: &str = "https://provesi.com/rol";

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity provider host, e.g. `tenant.us.auth0.com`.
    pub domain: Option<String>,

    /// Audience every accepted token must carry.
    pub audience: Option<String>,

    /// Overrides the key set URL derived from `domain`.
    pub jwks_uri: Option<String>,

    /// Namespaced role claim.
    pub role_claim: String,

    /// Timeout for a single key set fetch.
    pub jwks_timeout_secs: u64,

    /// Upper bound on one verification, key fetch included.
    pub request_timeout_secs: u64,

    /// Tolerance applied to `exp` and `nbf`.
    pub clock_skew_secs: u64,

    /// When set, cached keys older than this are refreshed on next use.
    pub key_cache_max_age_secs: Option<u64>,

    /// Allowed CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: None,
            audience: None,
            jwks_uri: None,
            role_claim: DEFAULT_ROLE_CLAIM.to_string(),
            jwks_timeout_secs: 5,
            request_timeout_secs: 10,
            clock_skew_secs: 0,
            key_cache_max_age_secs: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Provider host with surrounding whitespace removed.
    pub fn domain(&self) -> Option<&str> {
        self.domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience
            .as_deref()
            .map(str::trim)
            .filter(|audience| !audience.is_empty())
    }

    /// Expected `iss` claim: `https://{domain}/`.
    pub fn issuer(&self) -> Option<String> {
        self.domain().map(|domain| format!("https://{domain}/"))
    }

    /// Location of the provider's key set document.
    pub fn jwks_uri(&self) -> Option<String> {
        if let Some(uri) = self
            .jwks_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
        {
            return Some(uri.to_string());
        }
        self.domain()
            .map(|domain| format!("https://{domain}/.well-known/jwks.json"))
    }

    pub fn jwks_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn key_cache_max_age(&self) -> Option<Duration> {
        self.key_cache_max_age_secs.map(Duration::from_secs)
    }

    /// Validate the configuration before serving.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let domain = self.domain().ok_or(ConfigValidationError::MissingDomain)?;

        if domain.contains("://") || domain.contains('/') || domain.contains(char::is_whitespace)
        {
            return Err(ConfigValidationError::InvalidDomain(domain.to_string()));
        }

        if self.audience().is_none() {
            return Err(ConfigValidationError::MissingAudience);
        }

        if self.jwks_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroTimeout);
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// No provider domain configured.
    MissingDomain,
    /// Domain includes a scheme, path or whitespace.
    InvalidDomain(String),
    /// No expected audience configured.
    MissingAudience,
    /// A timeout of zero would reject every request.
    ZeroTimeout,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDomain => {
                write!(
                    f,
                    "Identity provider domain is required. Set AUTH0_DOMAIN or auth.domain in config."
                )
            }
            Self::InvalidDomain(domain) => {
                write!(
                    f,
                    "Identity provider domain '{}' must be a bare host name without scheme or path.",
                    domain
                )
            }
            Self::MissingAudience => {
                write!(
                    f,
                    "Expected audience is required. Set AUTH0_AUDIENCE or auth.audience in config."
                )
            }
            Self::ZeroTimeout => {
                write!(f, "JWKS and request timeouts must be greater than zero.")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.domain = Some("provesi.us.auth0.com".to_string());
        config.audience = Some("https://api.provesi.com".to_string());
        config
    }

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(config.domain.is_none());
        assert!(config.audience.is_none());
        assert_eq!(config.role_claim, DEFAULT_ROLE_CLAIM);
        assert_eq!(config.clock_skew_secs, 0);
        assert!(config.key_cache_max_age_secs.is_none());
    }

    #[test]
    fn test_derived_urls() {
        let config = valid_config();
        assert_eq!(
            config.issuer().as_deref(),
            Some("https://provesi.us.auth0.com/")
        );
        assert_eq!(
            config.jwks_uri().as_deref(),
            Some("https://provesi.us.auth0.com/.well-known/jwks.json")
        );
    }

    #[test]
    fn test_derived_urls_ignore_surrounding_whitespace() {
        let mut config = valid_config();
        config.domain = Some(" provesi.us.auth0.com\n".to_string());
        config.audience = Some(" https://api.provesi.com ".to_string());

        assert!(config.validate().is_ok());
        assert_eq!(
            config.issuer().as_deref(),
            Some("https://provesi.us.auth0.com/")
        );
        assert_eq!(
            config.jwks_uri().as_deref(),
            Some("https://provesi.us.auth0.com/.well-known/jwks.json")
        );
        assert_eq!(config.audience(), Some("https://api.provesi.com"));
    }

    #[test]
    fn test_jwks_uri_override() {
        let mut config = valid_config();
        config.jwks_uri = Some("http://127.0.0.1:9000/keys".to_string());
        assert_eq!(
            config.jwks_uri().as_deref(),
            Some("http://127.0.0.1:9000/keys")
        );
        // issuer still follows the domain
        assert_eq!(
            config.issuer().as_deref(),
            Some("https://provesi.us.auth0.com/")
        );
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_domain() {
        let mut config = valid_config();
        config.domain = Some("  ".to_string());
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::MissingDomain
        );
    }

    #[test]
    fn test_config_validation_domain_with_scheme() {
        let mut config = valid_config();
        config.domain = Some("https://provesi.us.auth0.com".to_string());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigValidationError::InvalidDomain(_)
        ));
    }

    #[test]
    fn test_config_validation_missing_audience() {
        let mut config = valid_config();
        config.audience = None;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::MissingAudience
        );
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = valid_config();
        config.request_timeout_secs = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::ZeroTimeout
        );
    }
}
