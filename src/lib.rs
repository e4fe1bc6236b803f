//! Bearer token authentication for HTTP APIs.
//!
//! Validates RS256-signed tokens against an identity provider's published
//! key set and enforces per-route scopes, as a pair of axum middlewares:
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{middleware::from_fn_with_state, routing::get, Router};
//! use jwt_gate::middleware::{require_jwt, require_scope, Claims, RequiredScope};
//! use jwt_gate::oidc::{JwksCache, TokenValidator, ValidationConfig};
//!
//! # fn build() -> Result<Router, Box<dyn std::error::Error>> {
//! let config = ValidationConfig::for_domain("tenant.auth.example.com", "https://api.example.com")?;
//! let keys = Arc::new(JwksCache::new(&config)?);
//! let validator = Arc::new(TokenValidator::new(config, keys));
//!
//! let app = Router::new()
//!     .route(
//!         "/orders",
//!         get(|claims: Claims| async move { format!("{:?}", claims.subject) })
//!             .route_layer(from_fn_with_state(RequiredScope::new("read:orders"), require_scope)),
//!     )
//!     .route_layer(from_fn_with_state(validator, require_jwt));
//! # Ok(app)
//! # }
//! ```

pub mod error;
pub mod middleware;
pub mod oidc;
pub mod routes;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{AuthError, AuthRejection, ConfigError};
pub use middleware::Claims;
pub use oidc::{has_scope, JwksCache, KeyProvider, TokenValidator, ValidatedClaims, ValidationConfig};
