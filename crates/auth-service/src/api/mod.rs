//! HTTP API module.
//!
//! Thin boundary over the verification pipeline: parses request bodies and
//! serializes results.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse, ValidationRejection};
pub use handlers::{DecodeResponse, HealthResponse, SERVICE_NAME, TokenBody, TokenRequest};
pub use routes::create_router;
pub use state::AppState;
