//! Claim sets.
//!
//! A [`Claims`] value is the token payload: an ordered JSON object. Registered
//! claims have typed accessors; everything else is reachable through
//! [`Claims::get`].

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Registered claim names.
pub mod names {
    pub const ISSUER: &str = "iss";
    pub const SUBJECT: &str = "sub";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRATION: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const ISSUED_AT: &str = "iat";
    pub const JWT_ID: &str = "jti";
    /// Embedded token of the party acting on behalf of the subject.
    pub const ACTOR: &str = "actort";
}

/// Token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Parse a JSON payload, rejecting non-objects and mistyped registered claims.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let claims = match value {
            Value::Object(map) => Self(map),
            _ => return Err(Error::MalformedToken("payload is not a JSON object".into())),
        };
        claims.check_registered()?;
        Ok(claims)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    // ------------------------------------------------------------------
    // Registered claim accessors
    // ------------------------------------------------------------------

    pub fn issuer(&self) -> Option<&str> {
        self.str_claim(names::ISSUER)
    }

    pub fn subject(&self) -> Option<&str> {
        self.str_claim(names::SUBJECT)
    }

    pub fn jwt_id(&self) -> Option<&str> {
        self.str_claim(names::JWT_ID)
    }

    pub fn actor_token(&self) -> Option<&str> {
        self.str_claim(names::ACTOR)
    }

    /// `aud` as a list, whether serialized as a string or an array.
    pub fn audiences(&self) -> Vec<String> {
        match self.0.get(names::AUDIENCE) {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.numeric_date(names::EXPIRATION)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.numeric_date(names::NOT_BEFORE)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.numeric_date(names::ISSUED_AT)
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn with_issuer(self, issuer: impl Into<String>) -> Self {
        self.with_claim(names::ISSUER, issuer.into())
    }

    pub fn with_subject(self, subject: impl Into<String>) -> Self {
        self.with_claim(names::SUBJECT, subject.into())
    }

    /// Single audience, serialized as a string.
    pub fn with_audience(self, audience: impl Into<String>) -> Self {
        self.with_claim(names::AUDIENCE, audience.into())
    }

    /// Audience list, serialized as an array.
    pub fn with_audiences<I, S>(self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = audiences
            .into_iter()
            .map(|a| Value::String(a.into()))
            .collect();
        self.with_claim(names::AUDIENCE, values)
    }

    pub fn with_expiration(self, at: DateTime<Utc>) -> Self {
        self.with_claim(names::EXPIRATION, at.timestamp())
    }

    pub fn with_not_before(self, at: DateTime<Utc>) -> Self {
        self.with_claim(names::NOT_BEFORE, at.timestamp())
    }

    pub fn with_issued_at(self, at: DateTime<Utc>) -> Self {
        self.with_claim(names::ISSUED_AT, at.timestamp())
    }

    pub fn with_jwt_id(self, id: impl Into<String>) -> Self {
        self.with_claim(names::JWT_ID, id.into())
    }

    /// Embed the serialized token of the acting party.
    pub fn with_actor_token(self, token: impl Into<String>) -> Self {
        self.with_claim(names::ACTOR, token.into())
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    fn numeric_date(&self, name: &str) -> Option<DateTime<Utc>> {
        let value = self.0.get(name)?;
        let secs = match value.as_i64() {
            Some(secs) => secs,
            None => {
                let f = value.as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                f.floor() as i64
            }
        };
        DateTime::from_timestamp(secs, 0)
    }

    /// Registered claims must have their RFC 7519 JSON types.
    fn check_registered(&self) -> Result<()> {
        for name in [names::ISSUER, names::SUBJECT, names::JWT_ID, names::ACTOR] {
            if let Some(value) = self.0.get(name) {
                if !value.is_string() {
                    return Err(Error::MalformedToken(format!("'{}' must be a string", name)));
                }
            }
        }

        match self.0.get(names::AUDIENCE) {
            None | Some(Value::String(_)) => {}
            Some(Value::Array(values)) if values.iter().all(Value::is_string) => {}
            Some(_) => {
                return Err(Error::MalformedToken(
                    "'aud' must be a string or an array of strings".into(),
                ))
            }
        }

        for name in [names::EXPIRATION, names::NOT_BEFORE, names::ISSUED_AT] {
            if self.0.contains_key(name) && self.numeric_date(name).is_none() {
                return Err(Error::MalformedToken(format!(
                    "'{}' must be a NumericDate",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
