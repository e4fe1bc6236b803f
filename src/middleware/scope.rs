//! Route-scoped permission check.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use super::jwt::Claims;
use crate::error::AuthRejection;
use crate::oidc::has_scope;

/// Scope a route requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredScope(Arc<str>);

impl RequiredScope {
    pub fn new(scope: impl AsRef<str>) -> Self {
        Self(Arc::from(scope.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequiredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware: reject requests whose claims lack the required scope.
///
/// Must run after [`super::require_jwt`]. Missing claims mean the layers
/// were installed in the wrong order; that is logged as an error and
/// answered with 500.
pub async fn require_scope(
    State(required): State<RequiredScope>,
    request: Request,
    next: Next,
) -> Response {
    let Some(claims) = request.extensions().get::<Claims>() else {
        error!(
            scope = %required,
            path = %request.uri().path(),
            "No validated claims in request context; scope layer installed before JWT layer"
        );
        return AuthRejection::MissingClaims.into_response();
    };

    if !has_scope(claims, required.as_str()) {
        debug!(
            scope = %required,
            sub = ?claims.subject,
            granted = ?claims.scope,
            "Insufficient scope"
        );
        return AuthRejection::InsufficientScope.into_response();
    }

    next.run(request).await
}
