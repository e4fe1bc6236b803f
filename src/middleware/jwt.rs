//! Bearer token validation middleware.
//!
//! Extracts the token from the `Authorization` header, validates it and
//! stores the resulting claims in the request extensions as [`Claims`].
//! Every failure is answered with the same 401 body; the cause is only
//! logged.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::AuthRejection;
use crate::oidc::{TokenValidator, ValidatedClaims};

/// Validated claims attached to a request by [`require_jwt`].
///
/// Handlers take it as an extractor. It is only ever inserted by the
/// validation layer, so its absence means the layer did not run.
#[derive(Debug, Clone)]
pub struct Claims(pub Arc<ValidatedClaims>);

impl Deref for Claims {
    type Target = ValidatedClaims;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Claims {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Claims>().cloned().ok_or_else(|| {
            error!(
                path = %parts.uri.path(),
                "No validated claims in request context; JWT layer is not installed on this route"
            );
            AuthRejection::MissingClaims
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is case-insensitive; anything other than exactly two
/// whitespace-separated parts is rejected.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

/// Middleware: reject requests without a valid bearer token.
///
/// Install with `axum::middleware::from_fn_with_state(validator, require_jwt)`.
pub async fn require_jwt(
    State(validator): State<Arc<TokenValidator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        debug!(path = %request.uri().path(), "Missing or malformed Authorization header");
        return AuthRejection::Unauthenticated.into_response();
    };

    match validator.validate(token).await {
        Ok(claims) => {
            request.extensions_mut().insert(Claims(Arc::new(claims)));
            next.run(request).await
        }
        Err(e) => {
            warn!(
                kind = e.kind(),
                error = %e,
                path = %request.uri().path(),
                "Encountered error while validating JWT"
            );
            AuthRejection::Unauthenticated.into_response()
        }
    }
}
