//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{ClaimExtractor, TokenVerifier};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Verifies tokens against the provider's keys.
    pub verifier: Arc<TokenVerifier>,
    /// Maps verified claims onto the response shape.
    pub extractor: Arc<ClaimExtractor>,
    /// Allowed CORS origins. Empty allows any origin.
    pub allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(verifier: TokenVerifier, extractor: ClaimExtractor) -> Self {
        Self {
            verifier: Arc::new(verifier),
            extractor: Arc::new(extractor),
            allowed_origins: Arc::new(Vec::new()),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::new(origins);
        self
    }
}
