//! Identity claims attached to a call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized identity of the caller.
///
/// Built once per call from authorizer data or authenticated token claims and
/// never mutated afterwards. Missing claims default to empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "sub", default)]
    subject: String,
    #[serde(rename = "iss", default)]
    issuer: String,
    #[serde(rename = "aud", default)]
    audience: Vec<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl Claims {
    /// Create claims for a subject issued by `issuer`.
    pub fn new(subject: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Project an authorizer payload onto claims.
    ///
    /// Expected shape is `{"claims": {"sub": .., "aud": ..}, "scopes": [..]}`.
    /// Never fails: anything missing or malformed is left at its default.
    pub fn from_authorizer(payload: &Value) -> Self {
        let Some(claims) = payload.get("claims").and_then(Value::as_object) else {
            return Self::default();
        };

        let mut identity = Self::from_claim_map(claims);
        identity.scopes = payload.get("scopes").map(parse_scopes).unwrap_or_default();
        identity
    }

    /// Project a verified token's claim map onto claims.
    ///
    /// Scopes are read from `scope` (space separated) or `scopes` (list).
    pub fn from_token_claims(claims: &Map<String, Value>) -> Self {
        let mut identity = Self::from_claim_map(claims);
        identity.scopes = claims
            .get("scope")
            .or_else(|| claims.get("scopes"))
            .map(parse_scopes)
            .unwrap_or_default();
        identity
    }

    fn from_claim_map(claims: &Map<String, Value>) -> Self {
        let text = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_owned);

        Self {
            id: text("jti"),
            subject: text("sub").unwrap_or_default(),
            issuer: text("iss").unwrap_or_default(),
            audience: claims.get("aud").map(parse_audience).unwrap_or_default(),
            scopes: Vec::new(),
            version: text("v"),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// True when no identity data was supplied at all.
    pub fn is_anonymous(&self) -> bool {
        self.subject.is_empty()
    }

    /// Check if the claims grant `required`.
    ///
    /// Empty scopes grant nothing.
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes.iter().any(|s| s == required)
    }

    /// Check if `audience` is one of the intended recipients.
    pub fn has_audience(&self, audience: &str) -> bool {
        self.audience.iter().any(|a| a == audience)
    }
}

/// Parse an audience claim.
///
/// Authorizers flatten lists into strings such as `"[a b]"`; plain scalars and
/// JSON arrays are accepted as well.
fn parse_audience(value: &Value) -> Vec<String> {
    match value {
        Value::String(raw) => raw
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split_whitespace()
            .map(str::to_owned)
            .collect(),
        Value::Array(items) => string_items(items),
        _ => Vec::new(),
    }
}

/// Parse a scope claim; non-string entries are skipped.
fn parse_scopes(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => string_items(items),
        Value::String(raw) => raw.split_whitespace().map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_authorizer_full_payload() {
        let payload = json!({
            "claims": {
                "jti": "tok-1",
                "v": "2",
                "iss": "https://issuer.example",
                "sub": "u1",
                "aud": "[a b]"
            },
            "scopes": ["read", "write"]
        });

        let claims = Claims::from_authorizer(&payload);
        assert_eq!(claims.id(), Some("tok-1"));
        assert_eq!(claims.version(), Some("2"));
        assert_eq!(claims.issuer(), "https://issuer.example");
        assert_eq!(claims.subject(), "u1");
        assert_eq!(claims.audience(), ["a", "b"]);
        assert_eq!(claims.scopes(), ["read", "write"]);
    }

    #[test]
    fn test_from_authorizer_empty_payload() {
        assert_eq!(Claims::from_authorizer(&json!({})), Claims::default());
        assert_eq!(Claims::from_authorizer(&Value::Null), Claims::default());
        assert!(Claims::from_authorizer(&json!({})).is_anonymous());
    }

    #[test]
    fn test_from_authorizer_without_claims_ignores_scopes() {
        let claims = Claims::from_authorizer(&json!({"scopes": ["read"]}));
        assert!(claims.scopes().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let payload = json!({
            "claims": {"sub": 42, "aud": {"nested": true}, "iss": null},
            "scopes": ["read", 7, null, {"x": 1}, "admin"]
        });

        let claims = Claims::from_authorizer(&payload);
        assert_eq!(claims.subject(), "");
        assert!(claims.audience().is_empty());
        assert_eq!(claims.issuer(), "");
        assert_eq!(claims.scopes(), ["read", "admin"]);
    }

    #[test]
    fn test_audience_encodings() {
        assert_eq!(parse_audience(&json!("api")), ["api"]);
        assert_eq!(parse_audience(&json!("[api]")), ["api"]);
        assert_eq!(parse_audience(&json!("[a  b c]")), ["a", "b", "c"]);
        assert_eq!(parse_audience(&json!(["a", 1, "b"])), ["a", "b"]);
        assert!(parse_audience(&json!("")).is_empty());
        assert!(parse_audience(&json!("[]")).is_empty());
    }

    #[test]
    fn test_from_token_claims_scope_string() {
        let map = json!({
            "sub": "alice",
            "iss": "devserver",
            "aud": ["console"],
            "v": "1",
            "scope": "read write"
        });

        let claims = Claims::from_token_claims(map.as_object().unwrap());
        assert_eq!(claims.subject(), "alice");
        assert_eq!(claims.audience(), ["console"]);
        assert_eq!(claims.scopes(), ["read", "write"]);
        assert!(claims.has_audience("console"));
    }

    #[test]
    fn test_claims_has_scope_exact() {
        let claims = Claims::new("alice", "issuer").with_scopes(vec!["infer".to_owned()]);
        assert!(claims.has_scope("infer"));
        assert!(!claims.has_scope("train"));
    }

    #[test]
    fn test_claims_empty_scopes_grant_nothing() {
        let claims = Claims::new("alice", "issuer");
        assert!(!claims.has_scope("infer"));
    }

    #[test]
    fn test_claims_serde_uses_registered_claim_names() {
        let claims = Claims::new("alice", "iss-1").with_id("jti-9");
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["sub"], "alice");
        assert_eq!(value["iss"], "iss-1");
        assert_eq!(value["jti"], "jti-9");
        assert!(value.get("v").is_none());
    }
}
