//! HTTP request handlers.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{FromRequest, Request, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::auth::{DecodedToken, ValidationResult, decode_unverified};

use super::error::{ApiError, ApiResult, ValidationRejection};
use super::state::AppState;

pub const SERVICE_NAME: &str = "auth-service";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
    })
}

/// Body of the validate and decode endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// The `token` field of a request body.
///
/// Empty bodies and non-JSON content types count as a missing token. A JSON
/// body that does not deserialize is unexpected.
#[derive(Debug, Default)]
pub struct TokenBody {
    pub token: Option<String>,
}

impl TokenBody {
    /// The token, or a 400 when it is missing or empty.
    pub fn require(self) -> ApiResult<String> {
        match self.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ApiError::bad_request("Token is required")),
        }
    }
}

impl<S> FromRequest<S> for TokenBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::internal(format!("unreadable request body: {}", e.body_text())))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let mut req = Request::new(Body::from(bytes));
        *req.headers_mut() = headers;
        match Json::<TokenRequest>::from_request(req, state).await {
            Ok(Json(body)) => Ok(Self { token: body.token }),
            Err(JsonRejection::MissingJsonContentType(_)) => Ok(Self::default()),
            Err(rejection) => Err(ApiError::internal(format!(
                "unreadable request body: {}",
                rejection.body_text()
            ))),
        }
    }
}

/// Verify a token and report the identity it carries.
#[instrument(skip_all)]
pub async fn validate_token(
    State(state): State<AppState>,
    body: Result<TokenBody, ApiError>,
) -> Result<Json<ValidationResult>, ValidationRejection> {
    let token = body?.require()?;

    let claims = state.verifier.verify(&token).await?;
    debug!(sub = claims.sub().unwrap_or_default(), "Token verified");

    Ok(Json(state.extractor.extract(&claims)))
}

/// Unverified decode response. `decoded` is null when the token cannot be decoded.
#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    pub decoded: Option<DecodedToken>,
}

/// Decode a token without verifying it. For debugging only.
#[instrument(skip_all)]
pub async fn decode_token(body: TokenBody) -> ApiResult<Json<DecodeResponse>> {
    let token = body.require()?;
    let decoded = decode_unverified(&token)
        .inspect_err(|e| debug!(reason = ?e, "Token could not be decoded"))
        .ok();
    Ok(Json(DecodeResponse { decoded }))
}
