//! HS512 JWT issuance and verification

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::claims::claim_types;
use super::models::Claim;
use crate::error::{Result, ServiceError};

pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 20;

/// Registered claims owned by the issuer; callers cannot supply them.
const RESERVED_CLAIMS: &[&str] = &["iss", "aud", "exp"];

/// Signing configuration (`JWT:Secret`, `JWT:ValidIssuer`, `JWT:ValidAudience`).
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub valid_issuer: String,
    pub valid_audience: String,
    pub lifetime: Duration,
}

impl JwtSettings {
    pub fn new(
        secret: impl Into<String>,
        valid_issuer: impl Into<String>,
        valid_audience: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            valid_issuer: valid_issuer.into(),
            valid_audience: valid_audience.into(),
            lifetime: Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES),
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("valid_issuer", &self.valid_issuer)
            .field("valid_audience", &self.valid_audience)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Decoded token payload. Anything besides `iss`, `aud` and `exp` lands in
/// `assertions`; a claim type seen more than once is carried as an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(flatten)]
    pub assertions: Map<String, Value>,
}

impl TokenClaims {
    /// Flatten back into one claim per value.
    pub fn claims(&self) -> Vec<Claim> {
        let mut out = Vec::new();
        for (claim_type, value) in &self.assertions {
            match value {
                Value::Array(items) => {
                    out.extend(items.iter().map(|v| Claim::new(claim_type, value_text(v))))
                }
                other => out.push(Claim::new(claim_type, value_text(other))),
            }
        }
        out
    }

    pub fn values(&self, claim_type: &str) -> Vec<String> {
        match self.assertions.get(claim_type) {
            Some(Value::Array(items)) => items.iter().map(value_text).collect(),
            Some(other) => vec![value_text(other)],
            None => Vec::new(),
        }
    }

    pub fn email(&self) -> Option<String> {
        self.values(claim_types::EMAIL).into_iter().next()
    }

    pub fn jti(&self) -> Option<String> {
        self.values(claim_types::JTI).into_iter().next()
    }

    pub fn roles(&self) -> Vec<String> {
        self.values(claim_types::ROLE)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs claim sets into compact JWS tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Fails with `Configuration` when the secret is empty; there is no
    /// unsigned fallback.
    pub fn new(settings: JwtSettings) -> Result<Self> {
        if settings.secret.trim().is_empty() {
            return Err(ServiceError::Configuration(
                "JWT secret is missing or empty".into(),
            ));
        }
        if settings.lifetime <= Duration::zero() {
            return Err(ServiceError::Configuration(
                "JWT lifetime must be positive".into(),
            ));
        }
        let key = settings.secret.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            issuer: settings.valid_issuer,
            audience: settings.valid_audience,
            lifetime: settings.lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, claims: &[Claim]) -> Result<IssuedToken> {
        self.issue_at(claims, Utc::now())
    }

    /// Sign `claims` as if issued at `now`; `exp` is `now + lifetime`.
    pub fn issue_at(&self, claims: &[Claim], now: DateTime<Utc>) -> Result<IssuedToken> {
        let mut assertions = Map::new();
        for claim in claims {
            if RESERVED_CLAIMS.contains(&claim.claim_type.as_str()) {
                return Err(ServiceError::Other(format!(
                    "claim type {} is reserved",
                    claim.claim_type
                )));
            }
            let value = Value::String(claim.value.clone());
            match assertions.get_mut(&claim.claim_type) {
                None => {
                    assertions.insert(claim.claim_type.clone(), value);
                }
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }

        let expires_at = now + self.lifetime;
        let payload = TokenClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            assertions,
        };
        let token = encode(&Header::new(Algorithm::HS512), &payload, &self.encoding)
            .map_err(|e| ServiceError::Other(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn decode(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?;
        Ok(data.claims)
    }
}
