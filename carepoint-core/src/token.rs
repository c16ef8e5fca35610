//! Structural decoding of identity-provider bearer tokens.
//!
//! Only the payload segment is read, and only to personalise the portal and to
//! pick up role/expiry hints. Signatures are checked by the issuer and the
//! clinic backend, never here, so nothing decoded by this module may be the
//! sole basis of a trust decision.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

const GROUPS_CLAIM: &str = "cognito:groups";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token must have three segments, found {0}")]
    Segments(usize),
    #[error("Token payload is not valid base64url")]
    Base64,
    #[error("Token payload is not valid JSON: {0}")]
    Json(String),
    #[error("Token payload is not a JSON object")]
    NotAnObject,
}

/// Decoded token claims. `TokenPayload::default()` is the empty payload callers
/// fall back to when decoding fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenPayload {
    claims: Map<String, Value>,
}

/// Decode the middle segment of a `header.payload.signature` token.
pub fn decode_payload(token: &str) -> Result<TokenPayload, DecodeError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Segments(segments.len()));
    }

    let payload = segments[1].trim_end_matches('=');
    if payload.is_empty() {
        return Err(DecodeError::Base64);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| DecodeError::Base64)?;

    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))?;

    match value {
        Value::Object(claims) => Ok(TokenPayload { claims }),
        _ => Err(DecodeError::NotAnObject),
    }
}

impl TokenPayload {
    fn string_claim(&self, name: &str) -> Option<String> {
        self.claims
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn subject(&self) -> Option<String> {
        self.string_claim("sub")
    }

    pub fn email(&self) -> Option<String> {
        self.string_claim("email")
    }

    pub fn given_name(&self) -> Option<String> {
        self.string_claim("given_name")
    }

    pub fn family_name(&self) -> Option<String> {
        self.string_claim("family_name")
    }

    /// `exp` in epoch seconds. Accepts integers and integral floats.
    pub fn expires_at(&self) -> Option<i64> {
        match self.claims.get("exp")? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Group membership. The issuer sends either a JSON array or a
    /// comma-separated string; both are normalised to trimmed, non-empty names.
    pub fn groups(&self) -> Vec<String> {
        let raw: Vec<String> = match self.claims.get(GROUPS_CLAIM) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };

        raw.into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
