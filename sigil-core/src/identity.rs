//! Claims identity materialized from a validated token.

use crate::token::JsonWebToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authentication type recorded on identities built from tokens.
pub const AUTHENTICATION_TYPE: &str = "AuthenticationTypes.Federation";

/// Fallback issuer for claims of tokens without `iss`.
pub const DEFAULT_ISSUER: &str = "LOCAL AUTHORITY";

/// Value type of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimValueType {
    String,
    Integer,
    Double,
    Boolean,
    Json,
}

/// A single `(type, value)` assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub value_type: ClaimValueType,
    pub issuer: String,
}

impl Claim {
    /// Flatten one JSON claim into one or more claims. Arrays produce one
    /// claim per element; objects stay JSON.
    fn expand(claim_type: &str, value: &Value, issuer: &str) -> Vec<Claim> {
        let make = |value: String, value_type| Claim {
            claim_type: claim_type.to_string(),
            value,
            value_type,
            issuer: issuer.to_string(),
        };
        match value {
            Value::Null => Vec::new(),
            Value::String(s) => vec![make(s.clone(), ClaimValueType::String)],
            Value::Bool(b) => vec![make(b.to_string(), ClaimValueType::Boolean)],
            Value::Number(n) if n.is_i64() || n.is_u64() => {
                vec![make(n.to_string(), ClaimValueType::Integer)]
            }
            Value::Number(n) => vec![make(n.to_string(), ClaimValueType::Double)],
            Value::Array(items) => items
                .iter()
                .flat_map(|item| match item {
                    Value::Array(_) => vec![make(item.to_string(), ClaimValueType::Json)],
                    _ => Claim::expand(claim_type, item, issuer),
                })
                .collect(),
            Value::Object(_) => vec![make(value.to_string(), ClaimValueType::Json)],
        }
    }
}

/// The caller-facing identity of a validated token.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimsIdentity {
    authentication_type: String,
    claims: Vec<Claim>,
    name_claim_type: String,
    role_claim_type: String,
    actor: Option<Box<ClaimsIdentity>>,
    bootstrap_token: Option<String>,
}

impl ClaimsIdentity {
    pub(crate) fn from_token(
        token: &JsonWebToken,
        name_claim_type: String,
        role_claim_type: String,
    ) -> Self {
        let issuer = token.issuer().unwrap_or(DEFAULT_ISSUER).to_string();
        let claims = token
            .claims()
            .iter()
            .flat_map(|(claim_type, value)| Claim::expand(claim_type, value, &issuer))
            .collect();
        Self {
            authentication_type: AUTHENTICATION_TYPE.to_string(),
            claims,
            name_claim_type,
            role_claim_type,
            actor: None,
            bootstrap_token: None,
        }
    }

    pub(crate) fn with_actor(mut self, actor: ClaimsIdentity) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    pub(crate) fn with_bootstrap_token(mut self, raw: &str) -> Self {
        self.bootstrap_token = Some(raw.to_string());
        self
    }

    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    pub fn is_authenticated(&self) -> bool {
        !self.authentication_type.is_empty()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.find_all(claim_type).any(|c| c.value == value)
    }

    pub fn name_claim_type(&self) -> &str {
        &self.name_claim_type
    }

    pub fn role_claim_type(&self) -> &str {
        &self.role_claim_type
    }

    /// Value of the first claim of the name claim type.
    pub fn name(&self) -> Option<&str> {
        self.find_first(&self.name_claim_type).map(|c| c.value.as_str())
    }

    pub fn roles(&self) -> Vec<&str> {
        self.find_all(&self.role_claim_type)
            .map(|c| c.value.as_str())
            .collect()
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.has_claim(&self.role_claim_type, role)
    }

    /// Identity of the party acting on behalf of this one.
    pub fn actor(&self) -> Option<&ClaimsIdentity> {
        self.actor.as_deref()
    }

    /// Raw token text, kept only when the policy saves sign-in tokens.
    pub fn bootstrap_token(&self) -> Option<&str> {
        self.bootstrap_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::token::Header;
    use serde_json::json;

    fn token(claims: Claims) -> JsonWebToken {
        JsonWebToken::new(Header::unsigned(), claims, "a.b.")
    }

    #[test]
    fn test_claims_are_flattened() {
        let claims = Claims::new()
            .with_issuer("https://issuer")
            .with_claim("name", "alice")
            .with_claim("role", json!(["admin", "ops"]))
            .with_claim("age", 42)
            .with_claim("ratio", 0.5)
            .with_claim("verified", true)
            .with_claim("address", json!({"city": "Oslo"}))
            .with_claim("nothing", Value::Null);
        let identity = ClaimsIdentity::from_token(&token(claims), "name".into(), "role".into());

        assert_eq!(identity.name(), Some("alice"));
        assert_eq!(identity.roles(), vec!["admin", "ops"]);
        assert!(identity.is_in_role("ops"));
        assert_eq!(identity.find_first("age").unwrap().value_type, ClaimValueType::Integer);
        assert_eq!(identity.find_first("ratio").unwrap().value_type, ClaimValueType::Double);
        assert_eq!(identity.find_first("verified").unwrap().value, "true");
        assert_eq!(identity.find_first("address").unwrap().value_type, ClaimValueType::Json);
        assert!(identity.find_first("nothing").is_none());
        assert!(identity
            .claims()
            .iter()
            .all(|c| c.issuer == "https://issuer"));
    }

    #[test]
    fn test_missing_issuer_uses_local_authority() {
        let identity = ClaimsIdentity::from_token(
            &token(Claims::new().with_subject("bob")),
            "name".into(),
            "role".into(),
        );
        assert_eq!(identity.find_first("sub").unwrap().issuer, DEFAULT_ISSUER);
        assert!(identity.name().is_none());
        assert!(identity.is_authenticated());
    }

    #[test]
    fn test_custom_claim_types() {
        let claims = Claims::new()
            .with_claim("upn", "carol@example.com")
            .with_claim("groups", json!(["g1"]));
        let identity = ClaimsIdentity::from_token(&token(claims), "upn".into(), "groups".into());
        assert_eq!(identity.name(), Some("carol@example.com"));
        assert!(identity.is_in_role("g1"));
    }
}
