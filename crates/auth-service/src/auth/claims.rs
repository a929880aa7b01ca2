//! Token claims and the normalized validation result.

use serde::Serialize;
use serde_json::Value;

use super::config::DEFAULT_ROLE_CLAIM;
use super::token::JsonObject;

/// Decoded token payload.
///
/// Standard claims have typed accessors; everything else is reached by name
/// through [`TokenClaims::get`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims(JsonObject);

impl TokenClaims {
    pub fn new(claims: JsonObject) -> Self {
        Self(claims)
    }

    /// Raw claim value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// First claim among `names` holding a truthy value.
    ///
    /// `null`, `false`, `0`, `""` and absent claims are skipped.
    pub fn first_truthy(&self, names: &[&str]) -> Option<&Value> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| is_truthy(value))
    }

    pub fn sub(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    pub fn iss(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    pub fn into_inner(self) -> JsonObject {
        self.0
    }
}

impl From<JsonObject> for TokenClaims {
    fn from(claims: JsonObject) -> Self {
        Self(claims)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Standard claims echoed back to callers, verbatim.
///
/// Absent claims are omitted rather than serialized as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StandardClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<Value>,
}

/// Identity facts extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub rol: Option<Value>,
    pub user_id: Option<Value>,
    pub email: Option<Value>,
    pub decoded: StandardClaims,
}

/// Outcome of a validation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(flatten)]
    pub identity: Option<Identity>,
}

impl ValidationResult {
    pub fn valid(identity: Identity) -> Self {
        Self {
            is_valid: true,
            error: None,
            error_kind: None,
            identity: Some(identity),
        }
    }

    pub fn invalid(error: impl Into<String>, error_kind: Option<&'static str>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            error_kind,
            identity: None,
        }
    }
}

/// Maps verified claims onto the normalized result.
#[derive(Debug, Clone)]
pub struct ClaimExtractor {
    role_claim: String,
}

impl Default for ClaimExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ROLE_CLAIM)
    }
}

impl ClaimExtractor {
    pub fn new(role_claim: impl Into<String>) -> Self {
        Self {
            role_claim: role_claim.into(),
        }
    }

    /// Build the success result. Missing claims become `null`, never errors.
    pub fn extract(&self, claims: &TokenClaims) -> ValidationResult {
        let rol = claims
            .first_truthy(&[self.role_claim.as_str(), "rol"])
            .cloned();
        let user_id = claims.first_truthy(&["sub", "user_id"]).cloned();
        let email = claims.first_truthy(&["email"]).cloned();

        let decoded = StandardClaims {
            sub: claims.get("sub").cloned(),
            aud: claims.get("aud").cloned(),
            iss: claims.get("iss").cloned(),
            exp: claims.get("exp").cloned(),
            iat: claims.get("iat").cloned(),
        };

        ValidationResult::valid(Identity {
            rol,
            user_id,
            email,
            decoded,
        })
    }
}
