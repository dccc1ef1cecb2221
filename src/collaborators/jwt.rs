//! JWT validation and re-signing collaborator.
//!
//! Login claims are trusted only after passing through [`JwtValidator`];
//! nothing in the hub parses a token directly.

use crate::state::moderation::JwtRule;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token is invalid or expired: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("jwt collaborator is not configured")]
    NotConfigured,
}

/// Claims carried on a BareRTC login token. Field names match the wire
/// contract the host site's session signer is expected to emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub op: bool,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(rename = "profileURL", default)]
    pub profile_url: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub rules: Vec<String>,
    /// Standard expiry claim; `jsonwebtoken` enforces this during decode.
    pub exp: usize,
}

impl Claims {
    pub fn jwt_rules(&self) -> Vec<JwtRule> {
        self.rules.iter().filter_map(|r| JwtRule::parse(r)).collect()
    }
}

pub struct JwtValidator {
    secret: String,
}

impl JwtValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        JwtValidator { secret: secret.into() }
    }

    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    pub fn parse(&self, token: &str) -> Result<Claims, JwtError> {
        if !self.is_configured() {
            return Err(JwtError::NotConfigured);
        }
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let data = jsonwebtoken::decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    /// Re-signs a claims payload with the server secret, used by the admin
    /// `authenticate` endpoint and the periodic poll-transport token refresh.
    pub fn resign(&self, claims: &Claims) -> Result<String, JwtError> {
        if !self.is_configured() {
            return Err(JwtError::NotConfigured);
        }
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &key)?;
        Ok(token)
    }
}
