//! Bearer token validation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{crypto, decode_header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::config::ValidationConfig;
use super::jwks::KeyProvider;
use crate::error::AuthError;

/// Registered claims as they appear in the token payload.
#[derive(Debug, Deserialize)]
struct RawClaims {
    iss: Option<String>,
    sub: Option<String>,
    #[serde(default)]
    aud: Audience,
    exp: i64,
    iat: Option<i64>,
    nbf: Option<i64>,
    scope: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::None => Vec::new(),
            Audience::Single(s) => vec![s],
            Audience::Multiple(v) => v,
        }
    }
}

/// Claims of a token that passed every check. One per request.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedClaims {
    pub subject: Option<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    /// Space-separated granted permissions.
    pub scope: Option<String>,
    /// Provider-specific claims, passed through unchecked.
    pub custom: HashMap<String, serde_json::Value>,
}

/// Verifies bearer tokens against a key provider and a fixed configuration.
pub struct TokenValidator {
    config: ValidationConfig,
    keys: Arc<dyn KeyProvider>,
}

impl TokenValidator {
    pub fn new(config: ValidationConfig, keys: Arc<dyn KeyProvider>) -> Self {
        Self { config, keys }
    }

    /// Validate a raw token against the current time.
    pub async fn validate(&self, token: &str) -> Result<ValidatedClaims, AuthError> {
        self.validate_at(token, Utc::now()).await
    }

    /// Validate a raw token as of `now`.
    pub async fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatedClaims, AuthError> {
        let (message, payload, signature) = split_token(token)?;

        let header = decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("invalid header: {}", e)))?;
        if header.alg != self.config.algorithm {
            return Err(AuthError::MalformedToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("missing kid".to_string()))?;

        debug!(kid = %kid, alg = ?header.alg, "Validating token");

        let key = self.keys.get_key(&kid).await?;

        if key.algorithm().is_some_and(|alg| alg != self.config.algorithm) {
            debug!(kid = %kid, key_alg = ?key.algorithm(), "Key advertises a different algorithm");
            return Err(AuthError::InvalidSignature);
        }
        let verified = crypto::verify(
            signature,
            message.as_bytes(),
            key.decoding_key(),
            self.config.algorithm,
        )
        .unwrap_or(false);
        if !verified {
            return Err(AuthError::InvalidSignature);
        }

        let claims = decode_claims(payload)?;

        match claims.iss.as_deref() {
            Some(iss) if iss == self.config.issuer => {}
            other => {
                return Err(AuthError::IssuerMismatch {
                    expected: self.config.issuer.clone(),
                    actual: other.map(String::from),
                })
            }
        }

        if !claims.aud.contains(&self.config.audience) {
            return Err(AuthError::AudienceMismatch {
                expected: self.config.audience.clone(),
            });
        }

        let skew = i64::try_from(self.config.clock_skew_secs).unwrap_or(i64::MAX);
        let now = now.timestamp();
        if now > claims.exp.saturating_add(skew) {
            return Err(AuthError::TokenExpired);
        }
        for starts in [claims.iat, claims.nbf].into_iter().flatten() {
            if starts.saturating_sub(skew) > now {
                return Err(AuthError::TokenNotYetValid);
            }
        }

        let validated = ValidatedClaims {
            subject: claims.sub,
            issuer: self.config.issuer.clone(),
            audience: claims.aud.into_vec(),
            expires_at: timestamp(claims.exp, "exp")?,
            issued_at: claims.iat.map(|t| timestamp(t, "iat")).transpose()?,
            not_before: claims.nbf.map(|t| timestamp(t, "nbf")).transpose()?,
            scope: claims.scope,
            custom: claims.extra,
        };

        debug!(
            kid = %kid,
            sub = ?validated.subject,
            scope = ?validated.scope,
            "Token validated"
        );

        Ok(validated)
    }
}

/// Split into (signing input, payload, signature).
fn split_token(token: &str) -> Result<(&str, &str, &str), AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(AuthError::MalformedToken("empty segment".to_string()));
    }
    let message_len = segments[0].len() + 1 + segments[1].len();
    Ok((&token[..message_len], segments[1], segments[2]))
}

fn decode_claims(payload: &str) -> Result<RawClaims, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::ClaimsDecode(format!("payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::ClaimsDecode(e.to_string()))
}

fn timestamp(secs: i64, claim: &str) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::ClaimsDecode(format!("{} out of range", claim)))
}
