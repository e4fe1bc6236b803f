//! Error types for token validation, scope checks and configuration.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Body returned for every authentication failure, whatever the cause.
pub const AUTH_FAILURE_MESSAGE: &str = "Failed to validate JWT.";

/// Body returned when the token lacks the route's scope.
pub const INSUFFICIENT_SCOPE_MESSAGE: &str = "Insufficient scope.";

/// Body returned when the middleware chain is misassembled.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

/// Reasons a bearer token can be rejected.
///
/// Every variant is authentication-class: the middleware logs the variant and
/// its detail, then answers with the same generic 401 body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Not three base64url segments, bad header, missing `kid`, or an
    /// algorithm other than the configured one.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The key set could not be fetched or parsed.
    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),

    /// No key with this identifier exists, even after a fresh fetch.
    #[error("no signing key with kid '{kid}'")]
    KeyNotFound { kid: String },

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("failed to decode claims: {0}")]
    ClaimsDecode(String),

    #[error("issuer mismatch: expected '{expected}', got {actual:?}")]
    IssuerMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("audience mismatch: expected '{expected}'")]
    AudienceMismatch { expected: String },

    #[error("token expired")]
    TokenExpired,

    #[error("token not yet valid")]
    TokenNotYetValid,
}

impl AuthError {
    /// Stable identifier used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "malformed_token",
            Self::KeyFetch(_) => "key_fetch",
            Self::KeyNotFound { .. } => "key_not_found",
            Self::InvalidSignature => "invalid_signature",
            Self::ClaimsDecode(_) => "claims_decode",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::AudienceMismatch { .. } => "audience_mismatch",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
        }
    }
}

/// Invalid validator configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid issuer URL '{url}': {source}")]
    InvalidIssuer {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Rejection produced by the middleware chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// 401: token missing or failed validation.
    Unauthenticated,
    /// 403: valid token without the required scope.
    InsufficientScope,
    /// 500: scope check ran without validated claims in the request.
    MissingClaims,
}

#[derive(Serialize)]
struct MessageBody {
    message: &'static str,
}

impl AuthRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope => StatusCode::FORBIDDEN,
            Self::MissingClaims => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => AUTH_FAILURE_MESSAGE,
            Self::InsufficientScope => INSUFFICIENT_SCOPE_MESSAGE,
            Self::MissingClaims => INTERNAL_ERROR_MESSAGE,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = MessageBody {
            message: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
