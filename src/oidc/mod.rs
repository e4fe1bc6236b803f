//! Bearer token verification against an OIDC provider's published keys.
//!
//! Provides token validation using JSON Web Key Sets (JWKS) with TTL-bounded
//! caching, and exact-match scope checks on the validated claims.

pub mod config;
pub mod jwks;
pub mod scope;
pub mod validator;

pub use config::ValidationConfig;
pub use jwks::{JwksCache, KeyProvider, SigningKey};
pub use scope::has_scope;
pub use validator::{Audience, TokenValidator, ValidatedClaims};
