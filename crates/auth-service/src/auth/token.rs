//! Compact JWS parsing, shared by verification and the unverified decoder.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde_json::{Map, Value};

use super::AuthError;

/// A JSON object as found in token headers and payloads.
pub type JsonObject = Map<String, Value>;

/// A token split into segments with header and payload decoded.
///
/// Nothing here is trusted: the signature has not been checked.
#[derive(Debug, Clone)]
pub struct ParsedToken<'a> {
    pub header: JsonObject,
    pub payload: JsonObject,
    /// `header.payload` as received, the input the signature covers.
    pub signing_input: &'a str,
    /// Base64url signature segment, possibly empty.
    pub signature: &'a str,
}

impl<'a> ParsedToken<'a> {
    /// Split and decode a compact token.
    pub fn parse(token: &'a str) -> Result<Self, AuthError> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| AuthError::malformed("expected three segments"))?;
        let (header_segment, payload_segment) = signing_input
            .split_once('.')
            .ok_or_else(|| AuthError::malformed("expected three segments"))?;
        if payload_segment.contains('.') {
            return Err(AuthError::malformed("expected three segments"));
        }

        if !signature.bytes().all(is_base64url_byte) {
            return Err(AuthError::malformed("signature is not base64url"));
        }

        let header = decode_segment(header_segment, "header")?;
        let payload = decode_segment(payload_segment, "payload")?;

        Ok(Self {
            header,
            payload,
            signing_input,
            signature,
        })
    }

    /// The `alg` header, if it is a string.
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// The `kid` header, if it is a string.
    pub fn kid(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<JsonObject, AuthError> {
    if segment.is_empty() {
        return Err(AuthError::malformed(format!("{name} segment is empty")));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::malformed(format!("{name} is not base64url: {e}")))?;

    serde_json::from_slice::<JsonObject>(&bytes)
        .map_err(|e| AuthError::malformed(format!("{name} is not a JSON object: {e}")))
}

fn is_base64url_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Header, payload and raw signature of a token whose signature was not checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedToken {
    pub header: JsonObject,
    pub payload: JsonObject,
    pub signature: String,
}

/// Decode a token without verifying anything about it.
///
/// Only structure is checked. The result must never be treated as authenticated.
pub fn decode_unverified(token: &str) -> Result<DecodedToken, AuthError> {
    let parsed = ParsedToken::parse(token)?;
    Ok(DecodedToken {
        header: parsed.header,
        payload: parsed.payload,
        signature: parsed.signature.to_string(),
    })
}
