//! Token verification errors.

use thiserror::Error;

/// Failure to produce a signing key for a `kid`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key set was fetched but holds no key with this identifier.
    #[error("unable to find a signing key that matches '{0}'")]
    NotFound(String),

    /// The token header names no key at all.
    #[error("token header has no kid")]
    MissingKid,

    /// The key set could not be fetched or parsed.
    #[error("failed to retrieve signing keys: {0}")]
    Retrieval(String),
}

impl KeyError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::MissingKid => "KeyNotFound",
            Self::Retrieval(_) => "KeyRetrievalError",
        }
    }
}

/// Reasons a token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Not three base64url segments, or header/payload is not a JSON object.
    #[error("jwt malformed")]
    MalformedToken(String),

    /// Header names an algorithm other than RS256.
    #[error("invalid algorithm")]
    UnsupportedAlgorithm(String),

    /// The key resolver could not supply a key.
    #[error("error in secret or public key callback: {0}")]
    SigningKeyUnavailable(#[from] KeyError),

    #[error("invalid signature")]
    InvalidSignature,

    /// `exp` lies further in the past than the allowed clock skew.
    #[error("jwt expired")]
    TokenExpired,

    /// `nbf` is after the current time.
    #[error("jwt not active")]
    TokenNotYetValid,

    #[error("jwt audience invalid. expected: {expected}")]
    AudienceMismatch { expected: String },

    #[error("jwt issuer invalid. expected: {expected}")]
    IssuerMismatch { expected: String },

    /// Verification did not finish within the configured deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedToken(detail.into())
    }

    /// Stable name of the failure, reported to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "MalformedToken",
            Self::UnsupportedAlgorithm(_) => "UnsupportedAlgorithm",
            Self::SigningKeyUnavailable(err) => err.kind(),
            Self::InvalidSignature => "InvalidSignature",
            Self::TokenExpired => "TokenExpired",
            Self::TokenNotYetValid => "TokenNotYetValid",
            Self::AudienceMismatch { .. } => "AudienceMismatch",
            Self::IssuerMismatch { .. } => "IssuerMismatch",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Internal(_) => "InternalError",
        }
    }
}
